//! The tree header page.
//!
//! One persisted page whose only field is the current root's page id.
//! Tracking the root through a page (rather than a field on the tree
//! struct) means root changes go through the buffer pool like any other
//! page write and are covered by the header page's latch.

use byteorder::{ByteOrder, LittleEndian};

use crate::common::PageId;

const OFFSET_ROOT: usize = 0;

/// Read-only view of the header page.
pub(crate) struct HeaderRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn root_page_id(&self) -> PageId {
        PageId::new(LittleEndian::read_u32(&self.data[OFFSET_ROOT..]))
    }
}

/// Mutable view of the header page.
pub(crate) struct HeaderMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn set_root_page_id(&mut self, root: PageId) {
        LittleEndian::write_u32(&mut self.data[OFFSET_ROOT..OFFSET_ROOT + 4], root.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::Page;

    #[test]
    fn test_header_roundtrip() {
        let mut page = Page::new();
        HeaderMut::new(page.as_mut_slice()).set_root_page_id(PageId::new(12));
        assert_eq!(HeaderRef::new(page.as_slice()).root_page_id(), PageId::new(12));

        HeaderMut::new(page.as_mut_slice()).set_root_page_id(PageId::INVALID);
        assert!(!HeaderRef::new(page.as_slice()).root_page_id().is_valid());
    }
}

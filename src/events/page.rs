use serde::Serialize;

use crate::error::{ServiceError, ServiceResult};

/// Page-number pagination derived from an offset
///
/// The page index is `from / size`, so an offset that is not a multiple of
/// `size` rounds down to the start of its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    size: i64,
}

impl PageRequest {
    pub fn from_offset(from: i64, size: i64) -> ServiceResult<Self> {
        if size <= 0 {
            return Err(ServiceError::Validation(format!(
                "page size must be positive, got {size}"
            )));
        }
        if from < 0 {
            return Err(ServiceError::Validation(format!(
                "offset must not be negative, got {from}"
            )));
        }
        Ok(Self {
            page: from / size,
            size,
        })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    /// First row of this page
    pub fn offset(&self) -> i64 {
        self.page * self.size
    }

    /// Cut this page out of an already ordered list
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.size as usize)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub size: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest) -> Self {
        Self {
            items,
            page: request.page(),
            size: request.size(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
        }
    }
}

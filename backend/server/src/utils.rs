use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MAX_PAGE_SIZE: usize = 100;

/// Joins the non-empty segments with single spaces, in the order given.
pub fn join_present<'a, I>(segments: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    segments
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rejects a blank required field.
pub fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidRequest(format!("{field} must not be blank")));
    }

    Ok(())
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: usize,
    pub total_pages: usize,
    pub page: usize,
    pub size: usize,
}

pub fn paginate<T>(items: Vec<T>, page: usize, size: usize) -> Result<Page<T>, AppError> {
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(AppError::InvalidRequest(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let offset = page
        .checked_mul(size)
        .ok_or_else(|| AppError::InvalidRequest(format!("page {page} is out of range")))?;

    let total_elements = items.len();
    let total_pages = total_elements.div_ceil(size);
    let content = items.into_iter().skip(offset).take(size).collect();

    Ok(Page {
        content,
        total_elements,
        total_pages,
        page,
        size,
    })
}

use crate::{Error, Result};
use serde::Serialize;

/// One entry of a page-number strip. Gaps serialize as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PageLink {
    Page(usize),
    Gap,
}

pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

fn check(page: usize, page_size: usize, total: usize) -> Result<usize> {
    if page_size == 0 {
        return Err(Error::InvalidPageSize);
    }
    let pages = total_pages(total, page_size);
    if page == 0 || page > pages {
        return Err(Error::PageOutOfRange { page, total_pages: pages });
    }
    Ok(pages)
}

/// The `page`-th (1-based) slice of `results`.
pub fn page<T>(results: &[T], page: usize, page_size: usize) -> Result<&[T]> {
    check(page, page_size, results.len())?;
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(results.len());
    Ok(&results[start..end])
}

/// Page numbers to display around `page`. Up to six pages are all shown;
/// otherwise the first page, up to four pages before the current one and up
/// to five after it, with gaps marking skipped ranges.
pub fn page_window(page: usize, page_size: usize, total: usize) -> Result<Vec<PageLink>> {
    let pages = check(page, page_size, total)?;
    if pages <= 6 {
        return Ok((1..=pages).map(PageLink::Page).collect());
    }

    let mut out = Vec::new();
    let lo = page.saturating_sub(4).max(1);
    if lo > 1 {
        out.push(PageLink::Page(1));
        if lo > 2 {
            out.push(PageLink::Gap);
        }
    }
    let hi = (page + 5).min(pages);
    out.extend((lo..=hi).map(PageLink::Page));
    if hi != page {
        out.push(PageLink::Gap);
    }
    Ok(out)
}

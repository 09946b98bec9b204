use serde::Serialize;

/// Page size bounds for list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Offset/limit slice handed to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
}

/// Requested page, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    /// A missing or zero page size falls back to the default; larger sizes are capped.
    pub fn new(page: Option<u64>, page_size: Option<u64>, limits: &PageLimits) -> Self {
        let page_size = match page_size {
            Some(size) if size > 0 => size.min(limits.max_page_size),
            _ => limits.default_page_size,
        };
        Self {
            page: page.unwrap_or(1),
            page_size,
        }
    }

    /// `None` when the offset would not fit a database `BIGINT`
    pub fn window(&self) -> Option<PageWindow> {
        let offset = self.page.saturating_sub(1).checked_mul(self.page_size)?;
        if offset > i64::MAX as u64 {
            return None;
        }
        Some(PageWindow {
            offset,
            limit: self.page_size,
        })
    }

    /// Pages past the end are invalid, except page 1 of an empty listing
    pub fn is_valid_for(&self, count: u64) -> bool {
        self.page >= 1 && self.page <= total_pages(count, self.page_size)
    }
}

/// Number of pages, never less than one
pub fn total_pages(count: u64, page_size: u64) -> u64 {
    if count == 0 || page_size == 0 {
        1
    } else {
        count.div_ceil(page_size)
    }
}

/// Builds absolute `next`/`previous` links from the current request URL
#[derive(Debug, Clone)]
pub struct PageLinks {
    base: String,
    params: Vec<(String, String)>,
}

impl PageLinks {
    /// `base` is scheme, host and path; `params` is the current query without `page`
    pub fn new(base: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            base: base.into(),
            params: params.into_iter().filter(|(k, _)| k != "page").collect(),
        }
    }

    pub fn for_page(&self, page: u64) -> String {
        let mut query: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        // Page 1 drops the parameter entirely
        if page > 1 {
            query.push(format!("page={}", page));
        }

        if query.is_empty() {
            self.base.clone()
        } else {
            format!("{}?{}", self.base, query.join("&"))
        }
    }
}

/// Pagination envelope shared by every list endpoint
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T: Serialize> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
    pub current_page: u64,
    pub total_pages: u64,
    pub page_size: u64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(results: Vec<T>, count: u64, request: &PageRequest, links: &PageLinks) -> Self {
        let total_pages = total_pages(count, request.page_size);
        let next = (request.page < total_pages).then(|| links.for_page(request.page + 1));
        let previous = (request.page > 1).then(|| links.for_page(request.page - 1));

        Self {
            count,
            next,
            previous,
            results,
            current_page: request.page,
            total_pages,
            page_size: request.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_defaults_and_cap() {
        let limits = PageLimits::default();
        assert_eq!(PageRequest::new(None, None, &limits).page_size, 20);
        assert_eq!(PageRequest::new(None, Some(0), &limits).page_size, 20);
        assert_eq!(PageRequest::new(None, Some(500), &limits).page_size, 100);
        assert_eq!(
            PageRequest::new(Some(3), Some(10), &limits).window(),
            Some(PageWindow { offset: 20, limit: 10 })
        );
    }

    #[test]
    fn test_window_rejects_unrepresentable_offsets() {
        let limits = PageLimits::default();

        assert_eq!(PageRequest::new(Some(u64::MAX), Some(100), &limits).window(), None);
        assert_eq!(PageRequest::new(Some(1_000_000_000_000_000_000), None, &limits).window(), None);

        let last = i64::MAX as u64 / 20 + 1;
        assert_eq!(
            PageRequest::new(Some(last), None, &limits).window().map(|w| w.offset),
            Some((last - 1) * 20)
        );
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 20), 1);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
    }

    #[test]
    fn test_page_validity() {
        let limits = PageLimits::default();
        assert!(PageRequest::new(Some(1), None, &limits).is_valid_for(0));
        assert!(!PageRequest::new(Some(2), None, &limits).is_valid_for(20));
        assert!(!PageRequest::new(Some(0), None, &limits).is_valid_for(20));
    }

    #[test]
    fn test_links_keep_other_params() {
        let links = PageLinks::new(
            "http://localhost/api/profiles",
            vec![
                ("search".to_string(), "new york".to_string()),
                ("page".to_string(), "2".to_string()),
            ],
        );

        assert_eq!(links.for_page(1), "http://localhost/api/profiles?search=new%20york");
        assert_eq!(links.for_page(3), "http://localhost/api/profiles?search=new%20york&page=3");
    }

    #[test]
    fn test_envelope_links() {
        let links = PageLinks::new("http://localhost/api/profiles", vec![]);
        let request = PageRequest::new(Some(2), Some(10), &PageLimits::default());
        let page = Paginated::new(vec![1, 2, 3], 25, &request, &links);

        assert_eq!(page.total_pages, 3);
        assert_eq!(page.next.as_deref(), Some("http://localhost/api/profiles?page=3"));
        assert_eq!(page.previous.as_deref(), Some("http://localhost/api/profiles"));
    }
}

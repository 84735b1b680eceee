//! Shared pagination query parameters for list endpoints

use serde::Deserialize;

use crate::error::{ApiError, ApiResult};

/// Maximum items per page for list endpoints
pub const MAX_LIMIT: i64 = 100;

/// Default page size when `limit` is omitted
pub const DEFAULT_LIMIT: i64 = 20;

/// `?limit=&offset=` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Validated `(limit, offset)`; out-of-range values are rejected, not clamped
    pub fn resolve(self) -> ApiResult<(i64, i64)> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ApiError::InvalidQueryParam {
                name: "limit",
                reason: format!("must be between 1 and {}", MAX_LIMIT),
            });
        }

        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::InvalidQueryParam {
                name: "offset",
                reason: "must not be negative".to_string(),
            });
        }

        Ok((limit, offset))
    }
}

/// `?page=&limit=` for page-numbered listings, converted to `(limit, offset)`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn resolve(self) -> ApiResult<(i64, i64)> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ApiError::InvalidQueryParam {
                name: "page",
                reason: "must be at least 1".to_string(),
            });
        }
        let (limit, _) = Pagination {
            limit: self.limit,
            offset: None,
        }
        .resolve()?;
        Ok((limit, (page - 1).saturating_mul(limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        assert_eq!(Pagination::default().resolve().unwrap(), (DEFAULT_LIMIT, 0));
        assert_eq!(PageQuery::default().resolve().unwrap(), (DEFAULT_LIMIT, 0));
    }

    #[test]
    fn test_limit_bounds() {
        let ok = Pagination { limit: Some(100), offset: Some(5) };
        assert_eq!(ok.resolve().unwrap(), (100, 5));

        for limit in [0, 101, -1] {
            let err = Pagination { limit: Some(limit), offset: None }.resolve();
            assert_matches!(err, Err(ApiError::InvalidQueryParam { name: "limit", .. }));
        }
    }

    #[test]
    fn test_negative_offset() {
        let err = Pagination { limit: None, offset: Some(-1) }.resolve();
        assert_matches!(err, Err(ApiError::InvalidQueryParam { name: "offset", .. }));
    }

    #[test]
    fn test_page_to_offset() {
        let query = PageQuery { page: Some(3), limit: Some(10) };
        assert_eq!(query.resolve().unwrap(), (10, 20));
        assert!(PageQuery { page: Some(0), limit: None }.resolve().is_err());
    }
}

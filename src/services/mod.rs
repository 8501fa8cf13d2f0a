pub mod message;
pub mod room;
pub mod user;

use serde::Serialize;

pub use message::MessageService;
pub use room::RoomService;
pub use user::UserService;

/// One page of results with navigation metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            has_next: page < total_pages,
            has_prev: page > 1 && total_pages > 0,
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Clamp a requested page/limit pair to sane bounds (`limit` capped at 100).
pub fn clamp_page(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(20).clamp(1, 100);
    (page, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_math() {
        let p = Paginated::new(vec![1, 2, 3], 7, 1, 3);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let p = Paginated::new(vec![7], 7, 3, 3);
        assert!(!p.has_next);
        assert!(p.has_prev);

        let p: Paginated<i64> = Paginated::new(vec![], 0, 1, 20);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_page(None, None), (1, 20));
        assert_eq!(clamp_page(Some(0), Some(500)), (1, 100));
        assert_eq!(clamp_page(Some(-3), Some(0)), (1, 1));
        assert_eq!(clamp_page(Some(4), Some(100)), (4, 100));
    }
}

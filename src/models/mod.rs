pub mod appointment;
pub mod document;
pub mod game_request;
pub mod user;
pub mod workflow;

/// Largest page size any list query will return.
pub const MAX_PER_PAGE: i64 = 100;

/// Clamp a requested page into range. Returns `(page, per_page, offset)`;
/// the offset saturates so an absurd page number reads as an empty page.
pub fn page_window(page: i64, per_page: i64) -> (i64, i64, i64) {
    let page = page.max(1);
    let per_page = per_page.clamp(1, MAX_PER_PAGE);
    (page, per_page, (page - 1).saturating_mul(per_page))
}

use std::future::Future;

use export_core::Page;
use export_logging::{export_debug, export_trace};
use tokio_util::sync::CancellationToken;

/// Drains a cursor-paginated listing into one ordered vector.
///
/// `fetch_page` is called with an empty cursor first and then with each
/// returned `next_cursor` until one comes back empty. Pages are fetched one
/// after another because each request needs the previous cursor.
///
/// The first error aborts the walk and is returned unchanged; items collected
/// so far are dropped.
pub async fn aggregate_pages<T, E, F, Fut>(
    cancel: &CancellationToken,
    mut fetch_page: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(String, CancellationToken) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    let mut cursor = String::new();
    let mut pages = 0usize;

    loop {
        let page = fetch_page(cursor, cancel.clone()).await?;
        pages += 1;
        export_trace!("page {} returned {} items", pages, page.items.len());
        let done = page.is_last();
        items.extend(page.items);

        if done {
            break;
        }
        cursor = page.next_cursor;
    }

    export_debug!("listing exhausted after {} pages, {} items", pages, items.len());
    Ok(items)
}

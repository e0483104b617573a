//! Generic page-walking loop shared by the repository and workflow listings.

use std::future::Future;

use crate::github::Page;

/// What the page callback wants to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Fetch the next page, if any
    Continue,
    /// Remaining pages are known to be irrelevant; finish successfully
    Stop,
}

/// Fetch pages until the source runs out, the callback stops, or an error occurs.
///
/// `fetch` receives the page to request (`None` for the first one). Empty
/// pages are never handed to `on_page`.
pub async fn paginate<T, E, F, Fut, C>(mut fetch: F, mut on_page: C) -> Result<(), E>
where
    F: FnMut(Option<u32>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    C: FnMut(Vec<T>) -> Result<PageOutcome, E>,
{
    let mut page = None;

    loop {
        let Page { items, next_page } = fetch(page).await?;

        if !items.is_empty() && on_page(items)? == PageOutcome::Stop {
            return Ok(());
        }

        match next_page {
            Some(next) => page = Some(next),
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<Page<u32>> {
        vec![
            Page {
                items: vec![1, 2],
                next_page: Some(2),
            },
            Page {
                items: vec![3],
                next_page: Some(3),
            },
            Page::last(vec![4, 5]),
        ]
    }

    async fn serve(pages: &[Page<u32>], page: Option<u32>) -> Result<Page<u32>, String> {
        let idx = page.unwrap_or(1) as usize - 1;
        pages
            .get(idx)
            .cloned()
            .ok_or_else(|| format!("no page {}", idx + 1))
    }

    #[tokio::test]
    async fn test_walks_all_pages() {
        let pages = pages();
        let mut seen = Vec::new();

        let result = paginate(
            |p| serve(&pages, p),
            |items| {
                seen.extend(items);
                Ok::<_, String>(PageOutcome::Continue)
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_stop_is_success() {
        let pages = pages();
        let mut requested = Vec::new();
        let mut calls = 0;

        let result = paginate(
            |p| {
                requested.push(p);
                serve(&pages, p)
            },
            |_| {
                calls += 1;
                Ok::<_, String>(PageOutcome::Stop)
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, 1);
        assert_eq!(requested, vec![None]);
    }

    #[tokio::test]
    async fn test_callback_error_propagates() {
        let pages = pages();

        let result = paginate(
            |p| serve(&pages, p),
            |items| {
                if items.contains(&3) {
                    Err("bad page".to_string())
                } else {
                    Ok(PageOutcome::Continue)
                }
            },
        )
        .await;

        assert_eq!(result, Err("bad page".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let pages = vec![Page {
            items: vec![1],
            next_page: Some(2),
        }];
        let mut seen = Vec::new();

        let result = paginate(
            |p| serve(&pages, p),
            |items| {
                seen.extend(items);
                Ok(PageOutcome::Continue)
            },
        )
        .await;

        assert_eq!(result, Err("no page 2".to_string()));
        assert_eq!(seen, vec![1]);
    }

    #[tokio::test]
    async fn test_empty_terminal_page_skips_callback() {
        let pages = vec![
            Page {
                items: vec![1],
                next_page: Some(2),
            },
            Page::last(vec![]),
        ];
        let mut calls = 0;

        let result = paginate(
            |p| serve(&pages, p),
            |_| {
                calls += 1;
                Ok::<_, String>(PageOutcome::Continue)
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }
}

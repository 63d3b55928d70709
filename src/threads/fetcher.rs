//! Paginated review thread fetch under hard caps.
//!
//! Threads are paged through the circuit breaker; each thread whose first
//! comment page was incomplete gets its remaining comments paged with
//! non-critical recovery. Both caps are memory/latency bounds: hitting
//! one logs a truncation warning and partial results are returned.

use tracing::{debug, warn};

use crate::config::PaginationConfig;
use crate::github::{ApiError, ThreadApi, ThreadPageEntry};
use crate::models::{FetchedThread, PullRequestRef};
use crate::recovery::{CircuitBreaker, ErrorRecovery};

/// Walks thread and comment pagination for one pull request.
pub struct ThreadFetcher<'a> {
    api: &'a dyn ThreadApi,
    breaker: &'a CircuitBreaker,
    recovery: &'a ErrorRecovery,
    limits: &'a PaginationConfig,
}

impl<'a> ThreadFetcher<'a> {
    pub fn new(
        api: &'a dyn ThreadApi,
        breaker: &'a CircuitBreaker,
        recovery: &'a ErrorRecovery,
        limits: &'a PaginationConfig,
    ) -> Self {
        Self {
            api,
            breaker,
            recovery,
            limits,
        }
    }

    /// Fetch every review thread, up to the configured caps.
    ///
    /// Fails only when the first page cannot be fetched; a failure on a
    /// later page ends pagination with the threads gathered so far.
    pub async fn fetch_all(&self, pr: &PullRequestRef) -> Result<Vec<FetchedThread>, ApiError> {
        let mut threads: Vec<FetchedThread> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0u32;

        loop {
            page += 1;
            let result = self.fetch_page(pr, cursor.as_deref()).await;
            let thread_page = match result {
                Ok(thread_page) => thread_page,
                Err(err) if page == 1 => return Err(err),
                Err(err) => {
                    warn!(
                        %pr,
                        page,
                        fetched = threads.len(),
                        "stopping thread pagination after error: {err}"
                    );
                    break;
                }
            };
            debug!(%pr, page, count = thread_page.threads.len(), "fetched review thread page");

            let remaining = self.limits.max_threads.saturating_sub(threads.len());
            let page_len = thread_page.threads.len();
            for entry in thread_page.threads.into_iter().take(remaining) {
                threads.push(self.complete_comments(entry).await);
            }

            if thread_cap_hit(
                self.limits.max_threads,
                threads.len(),
                page_len,
                remaining,
                thread_page.has_next_page,
            ) {
                warn!(
                    %pr,
                    cap = self.limits.max_threads,
                    "review thread count reached cap, results truncated"
                );
                break;
            }
            if !thread_page.has_next_page {
                break;
            }
            match thread_page.end_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(threads)
    }

    async fn fetch_page(
        &self,
        pr: &PullRequestRef,
        after: Option<&str>,
    ) -> Result<crate::github::ThreadPage, ApiError> {
        let api = self.api;
        let breaker = self.breaker;
        let page_size = self.limits.thread_page_size;
        let comment_page_size = self.limits.comment_page_size;

        let page = self
            .recovery
            .run("fetch review threads page", true, move || async move {
                breaker
                    .execute("review threads page", move || {
                        api.fetch_threads_page(pr, after, page_size, comment_page_size)
                    })
                    .await
                    .map_err(ApiError::from)
            })
            .await?;

        // Critical operations never skip; treat a skip as an empty last page.
        Ok(page.unwrap_or_default())
    }

    /// Page in the rest of a thread's comments, up to the per-thread cap.
    async fn complete_comments(&self, entry: ThreadPageEntry) -> FetchedThread {
        let cap = self.limits.max_comments_per_thread;
        let mut thread = entry.thread;
        let mut has_next = entry.comments_has_next_page;
        let mut cursor = entry.comments_end_cursor;

        if thread.comments.len() > cap {
            thread.comments.truncate(cap);
        }

        while has_next && thread.comments.len() < cap {
            let Some(after) = cursor.take() else { break };
            let api = self.api;
            let thread_id = thread.id.as_str();
            let after = after.as_str();
            let page_size = self.limits.comment_page_size;

            let result = self
                .recovery
                .run("fetch thread comments page", false, move || async move {
                    api.fetch_thread_comments_page(thread_id, Some(after), page_size)
                        .await
                })
                .await;

            let page = match result {
                Ok(Some(page)) => page,
                Ok(None) | Err(_) => {
                    warn!(
                        thread = %thread.id,
                        comments = thread.comments.len(),
                        "could not fetch all thread comments, continuing with partial thread"
                    );
                    return thread;
                }
            };

            let remaining = cap - thread.comments.len();
            for mut comment in page.comments.into_iter().take(remaining) {
                comment.file = Some(thread.file.clone());
                comment.line = thread.line;
                thread.comments.push(comment);
            }
            has_next = page.has_next_page;
            cursor = page.end_cursor;
        }

        if has_next {
            warn!(
                thread = %thread.id,
                cap,
                "thread comment count reached cap, results truncated"
            );
        }

        thread
    }
}

/// Whether stopping at the thread cap drops threads the platform still has,
/// either on the page just read or on pages after it.
fn thread_cap_hit(cap: usize, fetched: usize, page_len: usize, remaining: usize, has_next_page: bool) -> bool {
    page_len > remaining || (has_next_page && fetched >= cap)
}

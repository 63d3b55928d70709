//! GraphQL side of the GitHub client: review threads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::rest::GitHubClient;
use super::{ApiError, CommentPage, ThreadApi, ThreadPage, ThreadPageEntry};
use crate::models::{FetchedThread, PullRequestRef, ReviewComment};

const THREADS_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $first: Int!, $after: String, $commentsFirst: Int!) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $number) {
      reviewThreads(first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          id
          isResolved
          isOutdated
          path
          line
          originalLine
          comments(first: $commentsFirst) {
            pageInfo { hasNextPage endCursor }
            nodes {
              id
              databaseId
              body
              createdAt
              isMinimized
              author { login }
              pullRequestReview { databaseId }
            }
          }
        }
      }
    }
  }
}
"#;

const THREAD_COMMENTS_QUERY: &str = r#"
query($id: ID!, $first: Int!, $after: String) {
  node(id: $id) {
    ... on PullRequestReviewThread {
      comments(first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          id
          databaseId
          body
          createdAt
          isMinimized
          author { login }
          pullRequestReview { databaseId }
        }
      }
    }
  }
}
"#;

const ADD_REPLY_MUTATION: &str = r#"
mutation($threadId: ID!, $body: String!) {
  addPullRequestReviewThreadReply(input: {pullRequestReviewThreadId: $threadId, body: $body}) {
    comment { id }
  }
}
"#;

const RESOLVE_MUTATION: &str = r#"
mutation($threadId: ID!) {
  resolveReviewThread(input: {threadId: $threadId}) {
    thread { id isResolved }
  }
}
"#;

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    nodes: Vec<Option<T>>,
}

#[derive(Deserialize)]
struct ThreadsData {
    repository: Option<RepositoryNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    pull_request: Option<PullRequestNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    review_threads: Connection<ThreadNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadNode {
    id: String,
    is_resolved: bool,
    #[serde(default)]
    is_outdated: bool,
    path: Option<String>,
    line: Option<u32>,
    original_line: Option<u32>,
    comments: Connection<CommentNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentNode {
    id: String,
    database_id: Option<u64>,
    #[serde(default)]
    body: String,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_minimized: bool,
    author: Option<AuthorNode>,
    pull_request_review: Option<ReviewRefNode>,
}

#[derive(Deserialize)]
struct AuthorNode {
    login: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRefNode {
    database_id: Option<u64>,
}

#[derive(Deserialize)]
struct ThreadCommentsData {
    node: Option<ThreadCommentsNode>,
}

#[derive(Deserialize)]
struct ThreadCommentsNode {
    comments: Option<Connection<CommentNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddReplyData {
    add_pull_request_review_thread_reply: Option<AddReplyPayload>,
}

#[derive(Deserialize)]
struct AddReplyPayload {
    comment: Option<IdNode>,
}

#[derive(Deserialize)]
struct IdNode {
    id: String,
}

// ── Mapping ─────────────────────────────────────────────────────────

impl CommentNode {
    /// Prefer the numeric database id so GraphQL comments share identity
    /// with the REST listings.
    fn into_comment(self, thread_id: &str, file: &str, line: Option<u32>) -> ReviewComment {
        ReviewComment {
            id: Some(self.database_id.map(|id| id.to_string()).unwrap_or(self.id)),
            body: self.body,
            author: self.author.map(|a| a.login).unwrap_or_else(|| "ghost".to_string()),
            created_at: self.created_at,
            file: Some(file.to_string()),
            line,
            thread_id: Some(thread_id.to_string()),
            review_id: self.pull_request_review.and_then(|r| r.database_id),
            is_minimized: self.is_minimized,
        }
    }
}

impl ThreadNode {
    fn into_entry(self) -> ThreadPageEntry {
        let file = self.path.unwrap_or_default();
        let line = self.line.or(self.original_line);
        let comments = self
            .comments
            .nodes
            .into_iter()
            .flatten()
            .map(|c| c.into_comment(&self.id, &file, line))
            .collect();
        ThreadPageEntry {
            thread: FetchedThread {
                id: self.id,
                file,
                line,
                is_resolved: self.is_resolved,
                is_outdated: self.is_outdated,
                comments,
            },
            comments_has_next_page: self.comments.page_info.has_next_page,
            comments_end_cursor: self.comments.page_info.end_cursor,
        }
    }
}

impl GitHubClient {
    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ApiError> {
        let request = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .json(&serde_json::json!({ "query": query, "variables": variables }));
        let response: GraphQlResponse<T> = Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(ApiError::GraphQl(messages.join("; ")));
        }
        response
            .data
            .ok_or_else(|| ApiError::Decode("GraphQL response without data".to_string()))
    }
}

#[async_trait]
impl ThreadApi for GitHubClient {
    async fn fetch_threads_page(
        &self,
        pr: &PullRequestRef,
        after: Option<&str>,
        page_size: u32,
        comment_page_size: u32,
    ) -> Result<ThreadPage, ApiError> {
        let data: ThreadsData = self
            .graphql(
                THREADS_QUERY,
                serde_json::json!({
                    "owner": pr.owner,
                    "repo": pr.repo,
                    "number": pr.number,
                    "first": page_size,
                    "after": after,
                    "commentsFirst": comment_page_size,
                }),
            )
            .await?;

        let threads = data
            .repository
            .and_then(|r| r.pull_request)
            .ok_or_else(|| ApiError::Http {
                status: 404,
                message: format!("pull request {pr} not found"),
            })?
            .review_threads;

        Ok(ThreadPage {
            threads: threads.nodes.into_iter().flatten().map(ThreadNode::into_entry).collect(),
            has_next_page: threads.page_info.has_next_page,
            end_cursor: threads.page_info.end_cursor,
        })
    }

    async fn fetch_thread_comments_page(
        &self,
        thread_id: &str,
        after: Option<&str>,
        page_size: u32,
    ) -> Result<CommentPage, ApiError> {
        let data: ThreadCommentsData = self
            .graphql(
                THREAD_COMMENTS_QUERY,
                serde_json::json!({ "id": thread_id, "first": page_size, "after": after }),
            )
            .await?;

        let comments = data
            .node
            .and_then(|n| n.comments)
            .ok_or_else(|| ApiError::Http {
                status: 404,
                message: format!("review thread {thread_id} not found"),
            })?;

        // File and line are filled in by the caller from the owning thread.
        Ok(CommentPage {
            comments: comments
                .nodes
                .into_iter()
                .flatten()
                .map(|c| c.into_comment(thread_id, "", None))
                .collect(),
            has_next_page: comments.page_info.has_next_page,
            end_cursor: comments.page_info.end_cursor,
        })
    }

    async fn add_reply(&self, thread_id: &str, body: &str) -> Result<String, ApiError> {
        let data: AddReplyData = self
            .graphql(
                ADD_REPLY_MUTATION,
                serde_json::json!({ "threadId": thread_id, "body": body }),
            )
            .await?;
        data.add_pull_request_review_thread_reply
            .and_then(|p| p.comment)
            .map(|c| c.id)
            .ok_or_else(|| ApiError::Decode("reply mutation returned no comment".to_string()))
    }

    async fn resolve_thread(&self, thread_id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .graphql(RESOLVE_MUTATION, serde_json::json!({ "threadId": thread_id }))
            .await?;
        Ok(())
    }
}

//! Pagination driver (§5's "Pagination driver"): repeatedly invokes an
//! operation, threading an output token back in as the next request's
//! input token, until one of the closed set of termination conditions
//! fires.
//!
//! Grounded on the teacher's `ListObjectsRequest`/`is_truncated` manual
//! paging loop (one hardcoded field pair per operation); generalized
//! into a token-path-driven driver so generated code supplies only the
//! path strings and a per-page callback rather than hand-writing the loop
//! for every paginated operation.

use serde_json::Value;

/// A dotted path into a JSON-ish value tree, e.g. `"Marker"` or
/// `"CommonPrefixes.NextMarker"`. Dots separate object keys; there is no
/// array-index support, matching this core's token paths (which always
/// point at a scalar or an object field, never into a list).
fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_nullish(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Outcome of one page, fed back into the driver by the `fetch` closure.
pub struct Page {
    /// The decoded output, as a JSON value (generated code converts its
    /// typed output to this shape before handing it to the driver; full
    /// reflection into arbitrary typed outputs stays out of scope, same
    /// boundary as the request/response encoders).
    pub output: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The output token path was absent, null, or identical to the
    /// previous input token — continuing would loop forever.
    TokenExhausted,
    /// The operation's `moreResults` field (if declared) was `false`.
    NoMoreResults,
    /// The per-page callback returned `false`, asking to stop early.
    CallbackStopped,
}

/// Drives pagination for one operation.
///
/// - `input_token_path`/`output_token_path` locate the token field in the
///   request/response JSON trees.
/// - `more_results_path`, if set, locates a boolean field whose `false`
///   value ends pagination even if a token is still present.
/// - `initial_input` seeds the first request; the driver clones it and
///   rewrites the input token field before each subsequent call.
/// - `fetch` performs one operation call given the (possibly
///   token-rewritten) input and returns its decoded `Page` or an error.
/// - `on_page` is invoked once per successfully fetched page; returning
///   `false` stops pagination after that page (§5's "continue: false"
///   termination).
///
/// Returns the reason pagination stopped.
pub async fn paginate<F, Fut, E, OnPage>(
    initial_input: Value,
    input_token_path: &str,
    output_token_path: &str,
    more_results_path: Option<&str>,
    mut fetch: F,
    mut on_page: OnPage,
) -> Result<StopReason, E>
where
    F: FnMut(Value) -> Fut,
    Fut: std::future::Future<Output = Result<Page, E>>,
    OnPage: FnMut(&Page) -> bool,
{
    let mut input = initial_input;
    let mut previous_token: Option<Value> = None;

    loop {
        let page = fetch(input.clone()).await?;

        if !on_page(&page) {
            return Ok(StopReason::CallbackStopped);
        }

        if let Some(more_results_path) = more_results_path {
            if let Some(Value::Bool(false)) = get_path(&page.output, more_results_path) {
                return Ok(StopReason::NoMoreResults);
            }
        }

        let next_token = get_path(&page.output, output_token_path).cloned();
        if is_nullish(next_token.as_ref()) {
            return Ok(StopReason::TokenExhausted);
        }
        if previous_token.as_ref() == next_token.as_ref() {
            return Ok(StopReason::TokenExhausted);
        }

        input = set_path(input, input_token_path, next_token.clone().unwrap());
        previous_token = next_token;
    }
}

/// Rewrites `path` inside `value` (an object tree) to `new_value`,
/// creating intermediate objects as needed. Mirrors `get_path`'s
/// dotted-segment walk but mutates rather than reads.
fn set_path(mut value: Value, path: &str, new_value: Value) -> Value {
    let segments: Vec<&str> = path.split('.').collect();
    let mut cursor = &mut value;
    for (i, segment) in segments.iter().enumerate() {
        if !cursor.is_object() {
            *cursor = Value::Object(serde_json::Map::new());
        }
        let map = cursor.as_object_mut().expect("just ensured object");
        if i == segments.len() - 1 {
            map.insert(segment.to_string(), new_value);
            break;
        }
        cursor = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    value
}

/// Collects every page's output into a flat `Vec`, for callers that just
/// want "all the items" rather than streaming/early-stop control. The
/// `extract` closure pulls the item list out of each page's output.
pub async fn collect_all<F, Fut, E, T>(
    initial_input: Value,
    input_token_path: &str,
    output_token_path: &str,
    more_results_path: Option<&str>,
    fetch: F,
    mut extract: impl FnMut(&Page) -> Vec<T>,
) -> Result<Vec<T>, E>
where
    F: FnMut(Value) -> Fut,
    Fut: std::future::Future<Output = Result<Page, E>>,
{
    let mut items = Vec::new();
    let _ = paginate(
        initial_input,
        input_token_path,
        output_token_path,
        more_results_path,
        fetch,
        |page| {
            items.extend(extract(page));
            true
        },
    )
    .await?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Never;

    async fn fetch_fixed_pages(
        pages: Vec<Value>,
    ) -> impl FnMut(Value) -> std::future::Ready<Result<Page, Never>> {
        let mut iter = pages.into_iter();
        move |_input| std::future::ready(Ok(Page { output: iter.next().unwrap() }))
    }

    #[tokio::test]
    async fn stops_when_the_output_token_is_absent() {
        let pages = vec![
            json!({"NextMarker": "a", "Items": [1, 2]}),
            json!({"Items": [3]}),
        ];
        let mut fetch = fetch_fixed_pages(pages).await;
        let mut seen = Vec::new();
        let reason = paginate(
            json!({}),
            "Marker",
            "NextMarker",
            None,
            |input| fetch(input),
            |page| {
                seen.extend(page.output["Items"].as_array().unwrap().clone());
                true
            },
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::TokenExhausted);
        assert_eq!(seen, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn stops_when_the_token_is_unchanged_across_pages() {
        let pages = vec![
            json!({"NextMarker": "stuck", "Items": [1]}),
            json!({"NextMarker": "stuck", "Items": [2]}),
        ];
        let mut fetch = fetch_fixed_pages(pages).await;
        let reason = paginate(
            json!({}),
            "Marker",
            "NextMarker",
            None,
            |input| fetch(input),
            |_page| true,
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::TokenExhausted);
    }

    #[tokio::test]
    async fn stops_when_more_results_is_false() {
        let pages = vec![json!({"NextMarker": "a", "MoreResults": false, "Items": [1]})];
        let mut fetch = fetch_fixed_pages(pages).await;
        let reason = paginate(
            json!({}),
            "Marker",
            "NextMarker",
            Some("MoreResults"),
            |input| fetch(input),
            |_page| true,
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::NoMoreResults);
    }

    #[tokio::test]
    async fn stops_early_when_the_callback_returns_false() {
        let pages = vec![
            json!({"NextMarker": "a", "Items": [1]}),
            json!({"NextMarker": "b", "Items": [2]}),
        ];
        let mut fetch = fetch_fixed_pages(pages).await;
        let mut calls = 0;
        let reason = paginate(
            json!({}),
            "Marker",
            "NextMarker",
            None,
            |input| fetch(input),
            |_page| {
                calls += 1;
                false
            },
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::CallbackStopped);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn rewrites_the_input_token_path_before_each_call() {
        let pages = vec![
            json!({"NextMarker": "page-2-token", "Items": [1]}),
            json!({"Items": [2]}),
        ];
        let mut fetch_pages = pages.into_iter();
        let mut seen_inputs = Vec::new();
        let reason = paginate(
            json!({"Bucket": "demo"}),
            "Marker",
            "NextMarker",
            None,
            |input| {
                seen_inputs.push(input.clone());
                std::future::ready(Ok::<_, Never>(Page {
                    output: fetch_pages.next().unwrap(),
                }))
            },
            |_page| true,
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::TokenExhausted);
        assert_eq!(seen_inputs[0]["Marker"], Value::Null);
        assert_eq!(seen_inputs[1]["Marker"], json!("page-2-token"));
        assert_eq!(seen_inputs[1]["Bucket"], json!("demo"));
    }
}

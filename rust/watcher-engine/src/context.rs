//! Watcher-id correlation (spec §4.8: "a watcher id can be attached to a
//! request/context value and retrieved by downstream code for
//! correlation"). Implemented as a task-local, mirroring how the teacher's
//! `tracing` spans carry request-scoped fields through an async call tree.

tokio::task_local! {
    static WATCHER_ID: String;
}

/// Runs `fut` with `watcher_id` attached to the current task's context.
pub async fn with_watcher_id<F, T>(watcher_id: String, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    WATCHER_ID.scope(watcher_id, fut).await
}

/// The watcher id attached to the current task's context, if any.
pub fn current_watcher_id() -> Option<String> {
    WATCHER_ID.try_with(|id| id.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watcher_id_is_visible_inside_the_scope() {
        assert_eq!(current_watcher_id(), None);
        with_watcher_id("watcher-1".into(), async {
            assert_eq!(current_watcher_id().as_deref(), Some("watcher-1"));
        })
        .await;
        assert_eq!(current_watcher_id(), None);
    }
}

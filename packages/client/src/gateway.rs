//! Outbound user actions.
//!
//! Every write goes to the REST collaborator first. The push channel only
//! carries an additive hint after the write was confirmed.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    api::SessionApi,
    connection::PushChannel,
    error::{ClientError, ValidationError},
    model::{MAX_STARS, MIN_STARS, Minutes, Session},
    protocol::ClientMessage,
    store::{LoadFailure, SessionStore},
};

/// Validate a comment before it is submitted.
///
/// Returns the trimmed content and the star rating.
pub fn validate_comment(
    content: &str,
    stars: Option<u8>,
) -> Result<(&str, u8), ValidationError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let stars = stars.ok_or(ValidationError::MissingStars)?;
    if !(MIN_STARS..=MAX_STARS).contains(&stars) {
        return Err(ValidationError::StarsOutOfRange(stars));
    }
    Ok((content, stars))
}

/// Marks an action as running until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool, action: &'static str) -> Result<Self, ClientError> {
        if flag.swap(true, Ordering::AcqRel) {
            tracing::debug!("Rejected re-entrant {} submission", action);
            return Err(ClientError::SubmissionInFlight(action));
        }
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Entry point for everything the user does in a session view.
pub struct ActionGateway {
    api: Arc<dyn SessionApi>,
    store: Arc<SessionStore>,
    push: PushChannel,
    session_id: String,
    /// Cleared when the owning view is unmounted
    mounted: Arc<AtomicBool>,
    summary_in_flight: AtomicBool,
    comment_in_flight: AtomicBool,
    minutes_in_flight: AtomicBool,
}

impl ActionGateway {
    pub fn new(
        api: Arc<dyn SessionApi>,
        store: Arc<SessionStore>,
        push: PushChannel,
        mounted: Arc<AtomicBool>,
    ) -> Self {
        let session_id = store.session_id();
        Self {
            api,
            store,
            push,
            session_id,
            mounted,
            summary_in_flight: AtomicBool::new(false),
            comment_in_flight: AtomicBool::new(false),
            minutes_in_flight: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// Fail if the view was torn down while an awaited call was running.
    fn ensure_mounted(&self) -> Result<(), ClientError> {
        if self.is_mounted() {
            Ok(())
        } else {
            tracing::debug!("Discarding result for unmounted session '{}'", self.session_id);
            Err(ClientError::Unmounted)
        }
    }

    /// Whether a summary submission is waiting to settle.
    pub fn is_submitting_summary(&self) -> bool {
        self.summary_in_flight.load(Ordering::Acquire)
    }

    /// Whether a comment submission is waiting to settle.
    pub fn is_submitting_comment(&self) -> bool {
        self.comment_in_flight.load(Ordering::Acquire)
    }

    /// Whether a minutes save is waiting to settle.
    pub fn is_saving_minutes(&self) -> bool {
        self.minutes_in_flight.load(Ordering::Acquire)
    }

    /// Persist the speaker's summary, then hint other clients over the push channel.
    pub async fn submit_summary(&self, summary: &str) -> Result<(), ClientError> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(ValidationError::EmptySummary.into());
        }
        let _guard = InFlight::acquire(&self.summary_in_flight, "summary")?;

        self.api.submit_summary(&self.session_id, summary).await?;
        tracing::info!("Summary submitted for session '{}'", self.session_id);

        if !self.is_mounted() {
            return Ok(());
        }
        let hint = ClientMessage::SummarySubmitted {
            session_id: self.session_id.clone(),
            summary: summary.to_string(),
        };
        if !self.push.send(hint).await {
            tracing::debug!("Push channel not open, skipping summarySubmitted hint");
        }

        Ok(())
    }

    /// Post a rated comment and refresh the comment list.
    pub async fn submit_comment(
        &self,
        content: &str,
        stars: Option<u8>,
    ) -> Result<(), ClientError> {
        let (content, stars) = validate_comment(content, stars)?;
        let _guard = InFlight::acquire(&self.comment_in_flight, "comment")?;

        self.api.post_comment(&self.session_id, content, stars).await?;
        tracing::info!("Comment posted to session '{}' ({} stars)", self.session_id, stars);

        // The post already succeeded; a failed refresh shows up as the comments error.
        if let Err(e) = self.load_comments().await {
            tracing::warn!("Failed to refresh comments: {}", e);
        }

        Ok(())
    }

    /// Bulk-fetch the comment list and merge it into the store.
    ///
    /// A failure is recorded in the snapshot as `comments_error` until the
    /// next successful fetch.
    pub async fn load_comments(&self) -> Result<usize, ClientError> {
        let comments = match self.api.list_comments(&self.session_id).await {
            Ok(comments) => comments,
            Err(e) => {
                let e = ClientError::from(e);
                self.ensure_mounted()?;
                let failure = if e.requires_login() {
                    LoadFailure::LoginRequired
                } else {
                    LoadFailure::Failed(e.to_string())
                };
                self.store.set_comments_error(Some(failure));
                return Err(e);
            }
        };
        self.ensure_mounted()?;

        let count = comments.len();
        self.store.merge_fetched_comments(comments);
        self.store.set_comments_error(None);
        tracing::debug!("Loaded {} comments", count);
        Ok(count)
    }

    pub async fn load_minutes(&self) -> Result<Minutes, ClientError> {
        let minutes = self.api.get_minutes(&self.session_id).await?;
        self.ensure_mounted()?;
        Ok(minutes)
    }

    /// Replace the minutes document.
    pub async fn save_minutes(&self, content: &str) -> Result<(), ClientError> {
        let _guard = InFlight::acquire(&self.minutes_in_flight, "minutes")?;
        self.api.save_minutes(&self.session_id, content).await?;
        tracing::info!("Minutes saved for session '{}'", self.session_id);
        Ok(())
    }
}

/// Create a session outside of any session view.
pub async fn create_session(api: &dyn SessionApi, name: &str) -> Result<Session, ClientError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptySessionName.into());
    }
    let session = api.create_session(name).await?;
    tracing::info!("Session '{}' created ({})", session.name, session.id);
    Ok(session)
}

/// Delete a session outside of any session view.
pub async fn delete_session(api: &dyn SessionApi, session_id: &str) -> Result<(), ClientError> {
    api.delete_session(session_id).await?;
    tracing::info!("Session '{}' deleted", session_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::{Notify, mpsc};

    use super::*;
    use crate::{api::MockSessionApi, error::ApiError, model::{Comment, User}};

    fn comment(id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            content: format!("comment {id}"),
            stars: 7,
            author: Some("ann".to_string()),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: 500,
            message: "boom".to_string(),
        }
    }

    type Fixture = (ActionGateway, Arc<SessionStore>, PushChannel, Arc<AtomicBool>);

    fn gateway(api: impl SessionApi + 'static) -> Fixture {
        let store = Arc::new(SessionStore::new("s1"));
        let push = PushChannel::new();
        let mounted = Arc::new(AtomicBool::new(true));
        let gateway =
            ActionGateway::new(Arc::new(api), store.clone(), push.clone(), mounted.clone());
        (gateway, store, push, mounted)
    }

    #[test]
    fn test_validate_comment() {
        // テスト項目: コメント内容と星評価が送信前に検証される
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(validate_comment("  ", Some(5)), Err(ValidationError::EmptyContent));
        assert_eq!(validate_comment("ok", None), Err(ValidationError::MissingStars));
        assert_eq!(
            validate_comment("ok", Some(0)),
            Err(ValidationError::StarsOutOfRange(0))
        );
        assert_eq!(
            validate_comment("ok", Some(11)),
            Err(ValidationError::StarsOutOfRange(11))
        );
        assert_eq!(validate_comment(" good job ", Some(10)), Ok(("good job", 10)));
    }

    #[tokio::test]
    async fn test_invalid_comment_makes_no_network_call() {
        // テスト項目: 空のコメント、星評価なしのコメントはネットワーク呼び出し前に拒否される
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_post_comment().never();
        api.expect_list_comments().never();
        let (gateway, _store, _push, _mounted) = gateway(api);

        // when (操作):
        let empty = gateway.submit_comment("", Some(5)).await;
        let unrated = gateway.submit_comment("Nice", None).await;

        // then (期待する結果):
        assert!(matches!(
            empty,
            Err(ClientError::Validation(ValidationError::EmptyContent))
        ));
        assert!(matches!(
            unrated,
            Err(ClientError::Validation(ValidationError::MissingStars))
        ));
    }

    #[tokio::test]
    async fn test_submit_comment_posts_then_refreshes() {
        // テスト項目: コメント送信後にコメント一覧が再取得され、ストアに反映される
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_post_comment()
            .withf(|session_id, content, stars| {
                session_id == "s1" && content == "Great" && *stars == 8
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        api.expect_list_comments()
            .times(1)
            .returning(|_| Ok(vec![comment("1"), comment("2")]));
        let (gateway, store, _push, _mounted) = gateway(api);

        // when (操作):
        let result = gateway.submit_comment(" Great ", Some(8)).await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(store.snapshot().comments.len(), 2);
        assert!(!gateway.is_submitting_comment());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_recorded_and_cleared_on_retry() {
        // テスト項目: コメント取得の失敗がスナップショットに記録され、再取得の成功で解除される
        // given (前提条件):
        let mut api = MockSessionApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_list_comments()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(server_error()));
        api.expect_list_comments()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![comment("1")]));
        let (gateway, store, _push, _mounted) = gateway(api);

        // when (操作):
        let failed = gateway.load_comments().await;

        // then (期待する結果):
        assert!(matches!(failed, Err(ClientError::Api(ApiError::Status { status: 500, .. }))));
        assert!(matches!(
            store.snapshot().comments_error,
            Some(LoadFailure::Failed(_))
        ));

        // when (操作):
        let retried = gateway.load_comments().await;

        // then (期待する結果):
        assert_eq!(retried.unwrap(), 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.comments_error, None);
        assert_eq!(snapshot.comments.len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_fetch_requires_login() {
        // テスト項目: 認証切れによる取得失敗はログインが必要な状態として記録される
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_list_comments()
            .times(1)
            .returning(|_| Err(ApiError::Unauthorized));
        let (gateway, store, _push, _mounted) = gateway(api);

        // when (操作):
        let result = gateway.load_comments().await;

        // then (期待する結果):
        assert!(result.is_err_and(|e| e.requires_login()));
        assert_eq!(
            store.snapshot().comments_error,
            Some(LoadFailure::LoginRequired)
        );
    }

    #[tokio::test]
    async fn test_submit_summary_sends_push_hint_after_rest_write() {
        // テスト項目: REST 書き込み成功後に summarySubmitted ヒントがプッシュされる
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_submit_summary()
            .withf(|session_id, summary| session_id == "s1" && summary == "Shipped v2")
            .times(1)
            .returning(|_, _| Ok(()));
        let (gateway, _store, push, _mounted) = gateway(api);
        let (tx, mut rx) = mpsc::unbounded_channel();
        push.attach(tx).await;

        // when (操作):
        let result = gateway.submit_summary("Shipped v2").await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(
            rx.recv().await,
            Some(ClientMessage::SummarySubmitted {
                session_id: "s1".to_string(),
                summary: "Shipped v2".to_string(),
            })
        );
        assert!(!gateway.is_submitting_summary());
    }

    #[tokio::test]
    async fn test_failed_summary_sends_no_hint_and_releases_guard() {
        // テスト項目: REST 書き込みが失敗した場合、ヒントは送られず再送信が可能になる
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_submit_summary()
            .times(2)
            .returning(|_, _| Err(server_error()));
        let (gateway, _store, push, _mounted) = gateway(api);
        let (tx, mut rx) = mpsc::unbounded_channel();
        push.attach(tx).await;

        // when (操作):
        let first = gateway.submit_summary("done").await;
        let second = gateway.submit_summary("done").await;

        // then (期待する結果):
        assert!(matches!(first, Err(ClientError::Api(ApiError::Status { status: 500, .. }))));
        assert!(matches!(second, Err(ClientError::Api(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_summary_without_open_channel_still_succeeds() {
        // テスト項目: プッシュチャネルが閉じていても REST 書き込みが成功すれば成功とする
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_submit_summary().times(1).returning(|_, _| Ok(()));
        let (gateway, _store, _push, _mounted) = gateway(api);

        // when (操作):
        let result = gateway.submit_summary("done").await;

        // then (期待する結果):
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_results_after_unmount_are_discarded() {
        // テスト項目: アンマウント後に完了した取得結果はストアに反映されない
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_list_comments().returning(|_| Ok(vec![comment("1")]));
        let (gateway, store, _push, mounted) = gateway(api);
        mounted.store(false, Ordering::Release);

        // when (操作):
        let result = gateway.load_comments().await;

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::Unmounted)));
        assert!(store.snapshot().comments.is_empty());
    }

    #[tokio::test]
    async fn test_save_minutes_writes_document() {
        // テスト項目: 議事録がセッション ID とともに保存される
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_save_minutes()
            .withf(|session_id, content| session_id == "s1" && content == "- shipped v2")
            .times(1)
            .returning(|_, _| Ok(()));
        let (gateway, _store, _push, _mounted) = gateway(api);

        // when (操作):
        let result = gateway.save_minutes("- shipped v2").await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert!(!gateway.is_saving_minutes());
    }

    #[tokio::test]
    async fn test_create_session_rejects_blank_name() {
        // テスト項目: 空のセッション名は API を呼ばずに拒否される
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_create_session().never();

        // when (操作):
        let result = create_session(&api, "   ").await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ClientError::Validation(ValidationError::EmptySessionName))
        ));
    }

    #[tokio::test]
    async fn test_create_session_trims_name() {
        // テスト項目: セッション名は前後の空白を除いて作成される
        // given (前提条件):
        let mut api = MockSessionApi::new();
        api.expect_create_session()
            .withf(|name| name == "Weekly sync")
            .times(1)
            .returning(|name| {
                Ok(Session {
                    id: "7".to_string(),
                    name: name.to_string(),
                    created_at: None,
                })
            });

        // when (操作):
        let session = create_session(&api, "  Weekly sync ").await.unwrap();

        // then (期待する結果):
        assert_eq!(session.id, "7");
        assert_eq!(session.name, "Weekly sync");
    }

    /// Holds `post_comment` and `save_minutes` open until released.
    struct GatedApi {
        release: Arc<Notify>,
        entered: Arc<Notify>,
    }

    impl GatedApi {
        async fn hold(&self) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    #[async_trait]
    impl SessionApi for GatedApi {
        async fn current_user(&self) -> Result<Option<User>, ApiError> {
            Ok(None)
        }
        async fn create_session(&self, name: &str) -> Result<Session, ApiError> {
            Ok(Session {
                id: "new".to_string(),
                name: name.to_string(),
                created_at: None,
            })
        }
        async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
            Ok(vec![])
        }
        async fn delete_session(&self, _session_id: &str) -> Result<(), ApiError> {
            Ok(())
        }
        async fn list_comments(&self, _session_id: &str) -> Result<Vec<Comment>, ApiError> {
            Ok(vec![])
        }
        async fn post_comment(
            &self,
            _session_id: &str,
            _content: &str,
            _stars: u8,
        ) -> Result<(), ApiError> {
            self.hold().await;
            Ok(())
        }
        async fn submit_summary(&self, _session_id: &str, _summary: &str) -> Result<(), ApiError> {
            Ok(())
        }
        async fn get_minutes(&self, _session_id: &str) -> Result<Minutes, ApiError> {
            Ok(Minutes::default())
        }
        async fn save_minutes(&self, _session_id: &str, _content: &str) -> Result<(), ApiError> {
            self.hold().await;
            Ok(())
        }
    }

    fn gated() -> (Arc<ActionGateway>, Arc<Notify>, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        let api = GatedApi {
            release: release.clone(),
            entered: entered.clone(),
        };
        let (gateway, _store, _push, _mounted) = gateway(api);
        (Arc::new(gateway), release, entered)
    }

    #[tokio::test]
    async fn test_double_submission_is_rejected_until_settled() {
        // テスト項目: 送信中のコメントが完了するまで二重送信は拒否される
        // given (前提条件):
        let (gateway, release, entered) = gated();
        let first = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.submit_comment("first", Some(3)).await }
        });
        entered.notified().await;

        // when (操作):
        let second = gateway.submit_comment("second", Some(3)).await;

        // then (期待する結果):
        assert!(matches!(second, Err(ClientError::SubmissionInFlight("comment"))));
        assert!(gateway.is_submitting_comment());

        // when (操作):
        release.notify_one();
        let first = first.await.unwrap();

        // then (期待する結果):
        assert!(first.is_ok());
        assert!(!gateway.is_submitting_comment());
    }

    #[tokio::test]
    async fn test_concurrent_minutes_save_is_rejected() {
        // テスト項目: 議事録の保存中は次の保存が拒否され、完了後は再び保存できる
        // given (前提条件):
        let (gateway, release, entered) = gated();
        let first = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.save_minutes("draft 1").await }
        });
        entered.notified().await;

        // when (操作):
        let second = gateway.save_minutes("draft 2").await;

        // then (期待する結果):
        assert!(matches!(second, Err(ClientError::SubmissionInFlight("minutes"))));
        assert!(gateway.is_saving_minutes());

        // when (操作):
        release.notify_one();
        let first = first.await.unwrap();

        // then (期待する結果):
        assert!(first.is_ok());
        assert!(!gateway.is_saving_minutes());
    }
}

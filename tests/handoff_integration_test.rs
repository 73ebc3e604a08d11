//! 人工接管集成测试：两个引擎实例打开同一个 SQLite 文件，模拟用户进程与管理员进程

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bee_handoff::agent::create_engine_with_llm;
    use bee_handoff::config::AppConfig;
    use bee_handoff::llm::{LlmClient, LlmError, MockLlmClient, ScriptedLlmClient};
    use bee_handoff::memory::{Message, Role};
    use bee_handoff::workflow::{NodeId, WorkflowEngine};
    use bee_handoff::EngineError;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::Barrier;

    fn engine(db: &Path, llm: Arc<dyn LlmClient>) -> WorkflowEngine {
        let mut cfg = AppConfig::default();
        cfg.store.path = db.to_path_buf();
        create_engine_with_llm(&cfg, llm).unwrap()
    }

    fn scripted(outputs: Vec<Result<String, LlmError>>) -> Arc<ScriptedLlmClient> {
        Arc::new(ScriptedLlmClient::new(outputs))
    }

    fn escalate(query: &str) -> Result<String, LlmError> {
        Ok(json!({ "tool": "human_help", "args": { "query": query } }).to_string())
    }

    fn transcript(messages: &[Message]) -> Vec<(Role, String)> {
        messages
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_refund_handoff_across_processes() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");

        let user_llm = scripted(vec![escalate("refund request order 42.")]);
        let admin_llm = scripted(vec![Ok(
            "Your refund for order 42 is approved and arrives in 5 business days.".to_string(),
        )]);
        let user_side = engine(&db, user_llm.clone());
        let admin_side = engine(&db, admin_llm.clone());

        let state = user_side
            .invoke("t1", "I need a refund for order 42.")
            .await
            .unwrap();
        let pending = state.pending_interrupt.as_ref().unwrap();
        assert_eq!(pending.node, NodeId::Human);
        assert_eq!(pending.query(), Some("refund request order 42."));
        assert_eq!(admin_side.pending_threads().await.unwrap(), vec!["t1".to_string()]);

        // 管理员进程读到同一个挂起
        let seen = admin_side.get_state("t1").await.unwrap();
        assert_eq!(seen.pending_interrupt, state.pending_interrupt);

        let resumed = admin_side
            .resume("t1", "Refund approved, 5 business days.")
            .await
            .unwrap();
        assert!(resumed.pending_interrupt.is_none());
        assert_eq!(resumed.next, NodeId::End);
        assert_eq!(
            transcript(resumed.messages()),
            vec![
                (Role::User, "I need a refund for order 42.".to_string()),
                (
                    Role::System,
                    "Admin resolved this: Refund approved, 5 business days.".to_string()
                ),
                (
                    Role::Assistant,
                    "Your refund for order 42 is approved and arrives in 5 business days."
                        .to_string()
                ),
            ]
        );

        // 用户进程轮询到同样的状态
        let polled = user_side.get_state("t1").await.unwrap();
        assert_eq!(transcript(polled.messages()), transcript(resumed.messages()));
        assert!(admin_side.pending_threads().await.unwrap().is_empty());

        let nodes: Vec<Option<NodeId>> = admin_side
            .history("t1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.node)
            .collect();
        assert_eq!(
            nodes,
            vec![
                Some(NodeId::Decide),
                Some(NodeId::Tool),
                Some(NodeId::Human),
                Some(NodeId::Human),
                Some(NodeId::Decide),
            ]
        );
        assert_eq!(user_llm.calls(), 1);
        assert_eq!(admin_llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_direct_reply_never_suspends() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        let e = engine(&db, scripted(vec![Ok("We are open 9am to 6pm.".to_string())]));

        let state = e.invoke("t2", "What are your hours?").await.unwrap();
        assert!(state.pending_interrupt.is_none());
        assert_eq!(state.next, NodeId::End);
        assert!(e
            .history("t2")
            .await
            .unwrap()
            .iter()
            .all(|r| r.state.pending_interrupt.is_none()));
    }

    #[tokio::test]
    async fn test_resume_without_pending_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        let llm = scripted(vec![Ok("hello".to_string())]);
        let e = engine(&db, llm.clone());

        e.invoke("t2", "hi").await.unwrap();
        let before = e.get_state("t2").await.unwrap();

        let err = e.resume("t2", "stray answer").await.unwrap_err();
        assert!(matches!(err, EngineError::NoPendingInterrupt(_)));

        let after = e.get_state("t2").await.unwrap();
        assert_eq!(after.step, before.step);
        assert_eq!(after.messages(), before.messages());
        assert_eq!(e.history("t2").await.unwrap().len(), 1);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_thread() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir.path().join("checkpoints.db"), scripted(vec![]));

        assert!(matches!(
            e.get_state("nope").await,
            Err(EngineError::ThreadNotFound(_))
        ));
        assert!(matches!(
            e.resume("nope", "x").await,
            Err(EngineError::ThreadNotFound(_))
        ));
        assert!(matches!(
            e.recover("nope").await,
            Err(EngineError::ThreadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_decide_persists_nothing() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        let llm = scripted(vec![
            Err(LlmError::Network("connection reset".to_string())),
            Ok("Hi! How can I help?".to_string()),
        ]);
        let e = engine(&db, llm);

        let err = e.invoke("t3", "hello").await.unwrap_err();
        assert!(matches!(err, EngineError::CollaboratorUnavailable(_)));
        assert!(matches!(
            e.get_state("t3").await,
            Err(EngineError::ThreadNotFound(_))
        ));

        // 调用方重试同一输入
        let state = e.invoke("t3", "hello").await.unwrap();
        assert_eq!(
            transcript(state.messages()),
            vec![
                (Role::User, "hello".to_string()),
                (Role::Assistant, "Hi! How can I help?".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_recover_after_crash_matches_clean_run() {
        let answer = "Refund approved, 5 business days.";
        let reply = "Good news, your refund is on its way.";

        // 不中断的参照执行
        let clean_dir = TempDir::new().unwrap();
        let clean_db = clean_dir.path().join("checkpoints.db");
        let clean = engine(
            &clean_db,
            scripted(vec![escalate("refund order 42"), Ok(reply.to_string())]),
        );
        clean.invoke("t1", "I want a refund for order 42").await.unwrap();
        let expected = clean.resume("t1", answer).await.unwrap();

        // 管理员进程在 human 节点之后、decide 途中失败
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        engine(&db, scripted(vec![escalate("refund order 42")]))
            .invoke("t1", "I want a refund for order 42")
            .await
            .unwrap();

        let crashed = engine(&db, scripted(vec![Err(LlmError::Timeout)]));
        let err = crashed.resume("t1", answer).await.unwrap_err();
        assert!(matches!(err, EngineError::CollaboratorUnavailable(_)));

        let mid = crashed.get_state("t1").await.unwrap();
        assert!(mid.pending_interrupt.is_none());
        assert_eq!(mid.next, NodeId::Decide);
        assert_eq!(mid.messages().last().unwrap().role, Role::System);

        // 新进程从最近的 checkpoint 继续
        let restarted = engine(&db, scripted(vec![Ok(reply.to_string())]));
        let recovered = restarted.recover("t1").await.unwrap();

        assert_eq!(
            transcript(recovered.messages()),
            transcript(expected.messages())
        );
        assert_eq!(recovered.next, NodeId::End);
        let notes = recovered
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(notes, 1);

        // 已完成的线程再 recover 是空操作
        let again = restarted.recover("t1").await.unwrap();
        assert_eq!(again.step, recovered.step);
    }

    #[tokio::test]
    async fn test_concurrent_invokes_on_one_thread_are_serialized() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        let llm = scripted(vec![escalate("first"), escalate("second")]);
        let e = engine(&db, llm.clone());

        let (a, b) = tokio::join!(e.invoke("t1", "help with A"), e.invoke("t1", "help with B"));

        let results = [a, b];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let pending_errors = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::InterruptPending(_))))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(pending_errors, 1);

        let state = e.get_state("t1").await.unwrap();
        assert!(state.is_suspended());
        assert_eq!(state.messages().len(), 1);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_from_two_processes_never_interleave() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        let first = engine(&db, scripted(vec![Ok("reply one".to_string())]));
        let second = engine(&db, scripted(vec![Ok("reply two".to_string())]));

        let (a, b) = tokio::join!(first.invoke("t5", "one"), second.invoke("t5", "two"));
        for result in [&a, &b] {
            if let Err(e) = result {
                assert!(matches!(e, EngineError::Conflict { .. }), "unexpected {e:?}");
            }
        }
        assert!(a.is_ok() || b.is_ok());

        let history = first.history("t5").await.unwrap();
        let steps: Vec<u64> = history.iter().map(|r| r.step).collect();
        let expected: Vec<u64> = (1..=history.len() as u64).collect();
        assert_eq!(steps, expected);

        let state = first.get_state("t5").await.unwrap();
        let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
        for pair in roles.chunks(2) {
            assert_eq!(pair, [Role::User, Role::Assistant]);
        }
    }

    /// 两个线程都到达屏障才返回：若线程之间被串行化则会卡住
    struct BarrierLlm {
        barrier: Barrier,
    }

    #[async_trait]
    impl LlmClient for BarrierLlm {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            self.barrier.wait().await;
            Ok("done".to_string())
        }
    }

    #[tokio::test]
    async fn test_distinct_threads_run_independently() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        let e = engine(
            &db,
            Arc::new(BarrierLlm {
                barrier: Barrier::new(2),
            }),
        );

        let joined = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(e.invoke("a", "hi"), e.invoke("b", "hi"))
        })
        .await
        .expect("threads blocked each other");

        assert!(joined.0.is_ok());
        assert!(joined.1.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_threads_share_one_store() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        let e = Arc::new(engine(&db, Arc::new(MockLlmClient)));

        let calls = (0..8).map(|i| {
            let e = Arc::clone(&e);
            async move {
                let text = if i % 2 == 0 { "please help me" } else { "hello" };
                e.invoke(&format!("thread-{i}"), text).await
            }
        });
        let results = futures_util::future::join_all(calls).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let pending = e.pending_threads().await.unwrap();
        assert_eq!(pending.len(), 4);
        for i in (0..8).step_by(2) {
            assert!(pending.contains(&format!("thread-{i}")));
        }
    }

    #[tokio::test]
    async fn test_message_order_is_append_only() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        let e = engine(&db, Arc::new(MockLlmClient));

        let mut previous: Vec<(Role, String)> = Vec::new();
        for text in ["hi", "what time is it", "thanks"] {
            let state = e.invoke("t6", text).await.unwrap();
            let now = transcript(state.messages());
            assert_eq!(&now[..previous.len()], &previous[..]);
            previous = now;

            let seqs: Vec<u64> = state.messages().iter().map(|m| m.seq).collect();
            let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
            assert_eq!(seqs, expected);
        }
        assert_eq!(previous.len(), 6);
    }

    #[tokio::test]
    async fn test_mock_llm_end_to_end() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");
        let user_side = engine(&db, Arc::new(MockLlmClient));
        let admin_side = engine(&db, Arc::new(MockLlmClient));

        let state = user_side
            .invoke("t1", "I need a refund for order 42.")
            .await
            .unwrap();
        assert_eq!(
            state.pending_interrupt.as_ref().and_then(|p| p.query()),
            Some("I need a refund for order 42.")
        );

        let err = user_side.invoke("t1", "hello?").await.unwrap_err();
        assert!(matches!(err, EngineError::InterruptPending(_)));

        let resumed = admin_side.resume("t1", "Refund approved").await.unwrap();
        assert_eq!(
            resumed.messages().last().map(|m| m.content.as_str()),
            Some("Our support team got back to you: Refund approved")
        );
    }
}

use std::sync::Arc;

use nd_core::{ConversationStatus, Error, Extractor, PromptRole};
use nd_inference::ScriptedModel;
use nd_pipeline::{PipelineConfig, QueryRateLimiter, QueryService, QuotaConfig};
use nd_storage::{ConversationConfig, ConversationStore};

const ANSWER: &str = r#"Based on my search:

```json
{"answer": "The summit ended with a framework deal.", "sources": ["Reuters"], "related_topics": ["Trade"]}
```"#;

fn service(
    model: ScriptedModel,
    quota: QuotaConfig,
    conversations: ConversationConfig,
) -> (Arc<QueryService>, Arc<ScriptedModel>) {
    let model = Arc::new(model);
    let service = QueryService::new(
        model.clone(),
        Arc::new(ConversationStore::new(conversations)),
        Arc::new(QueryRateLimiter::new(quota)),
        Extractor::default(),
        &PipelineConfig::default(),
    );
    (Arc::new(service), model)
}

fn default_service(model: ScriptedModel) -> (Arc<QueryService>, Arc<ScriptedModel>) {
    service(model, QuotaConfig::default(), ConversationConfig::default())
}

#[tokio::test]
async fn test_query_completes_and_can_be_polled() {
    let (service, model) = default_service(ScriptedModel::new().reply([ANSWER]));

    let submission = service.submit("10.0.0.1", "How did the summit end?", None).unwrap();
    assert_eq!(submission.status, ConversationStatus::Processing);
    submission.worker.await.unwrap();

    let conversation = service.status(submission.id).unwrap();
    assert_eq!(conversation.status, ConversationStatus::Complete);
    let result = conversation.result.unwrap();
    assert_eq!(result.answer, "The summit ended with a framework deal.");
    assert_eq!(result.sources, vec!["Reuters".to_string()]);
    assert_eq!(conversation.history.len(), 1);

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].web_search.is_some());
}

#[tokio::test]
async fn test_follow_up_carries_history() {
    let (service, model) = default_service(ScriptedModel::new().reply([ANSWER]).reply([ANSWER]));

    let first = service.submit("10.0.0.1", "How did the summit end?", None).unwrap();
    let first_id = first.id;
    first.worker.await.unwrap();

    let second = service
        .submit("10.0.0.1", "Who objected?", Some(first_id))
        .unwrap();
    second.worker.await.unwrap();

    let messages = &model.requests()[1].messages;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].content, "How did the summit end?");
    assert_eq!(messages[1].role, PromptRole::Assistant);
    assert_eq!(messages[1].content, "The summit ended with a framework deal.");
    assert_eq!(service.status(second.id).unwrap().history.len(), 2);
}

#[tokio::test]
async fn test_upstream_failure_marks_conversation_failed() {
    let (service, _) = default_service(ScriptedModel::new().fail("overloaded"));

    let submission = service.submit("10.0.0.1", "Anything new?", None).unwrap();
    submission.worker.await.unwrap();

    let conversation = service.status(submission.id).unwrap();
    assert_eq!(conversation.status, ConversationStatus::Error);
    assert!(conversation.error.unwrap().contains("overloaded"));
    assert!(conversation.result.is_none());
}

#[tokio::test]
async fn test_quota_refuses_before_creating() {
    let quota = QuotaConfig {
        max_requests: 2,
        ..QuotaConfig::default()
    };
    let (service, _) = service(
        ScriptedModel::new().reply([ANSWER]).reply([ANSWER]),
        quota,
        ConversationConfig::default(),
    );

    for _ in 0..2 {
        service.submit("10.0.0.1", "q", None).unwrap().worker.await.unwrap();
    }
    assert!(matches!(
        service.submit("10.0.0.1", "q", None),
        Err(Error::RateLimited { .. })
    ));
    assert_eq!(service.store().len(), 2);

    // Another caller still has its own quota.
    assert!(service.submit("10.0.0.2", "q", None).is_ok());
}

#[tokio::test]
async fn test_full_store_refuses_without_evicting() {
    let conversations = ConversationConfig {
        capacity: 1,
        ..ConversationConfig::default()
    };
    let (service, _) = service(
        ScriptedModel::new().reply([ANSWER]),
        QuotaConfig::default(),
        conversations,
    );

    let first = service.submit("10.0.0.1", "q", None).unwrap();
    let first_id = first.id;
    first.worker.await.unwrap();

    assert!(matches!(
        service.submit("10.0.0.2", "q", None),
        Err(Error::CapacityExceeded)
    ));
    assert_eq!(
        service.status(first_id).unwrap().status,
        ConversationStatus::Complete
    );
}

#[tokio::test]
async fn test_invalid_query_is_not_charged() {
    let (service, model) = default_service(ScriptedModel::new());

    assert!(matches!(
        service.submit("10.0.0.1", &"x".repeat(501), None),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        service.submit("10.0.0.1", "   ", None),
        Err(Error::InvalidInput(_))
    ));
    assert_eq!(service.limiter().tracked_callers(), 0);
    assert!(service.store().is_empty());
    assert!(model.requests().is_empty());
}

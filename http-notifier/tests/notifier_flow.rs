mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use http_notifier::notification::DELIVERY_USER_AGENT;
use http_notifier::{
    Build, BuildStatus, ContextError, Error, HandleOutcome, HttpNotifier, RequestContext,
};

use common::{LogCapture, Receiver, build, closed_url, config, config_with_params, notifier};

const SUCCESS_FILTER: &str = "build.status == Build.Status.SUCCESS";

async fn notifier_for_success(receiver: &Receiver) -> HttpNotifier {
    notifier(&config(SUCCESS_FILTER, &receiver.url(), "x"))
        .await
        .unwrap()
}

#[tokio::test]
async fn successful_build_posts_rendered_json_string() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config(
        "status == SUCCESS",
        &receiver.url(),
        "Build {{.Build.Id}} succeeded",
    ))
    .await
    .unwrap();

    let event = Build::new("b-1", BuildStatus::Success).with_log_url("https://x/log");
    let outcome = notifier.handle(&RequestContext::new(), &event).await.unwrap();
    assert_eq!(outcome, HandleOutcome::Delivered { status: StatusCode::OK });

    let requests = receiver.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.body.as_ref(), b"\"Build b-1 succeeded\"");
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("user-agent"), Some(DELIVERY_USER_AGENT));
}

#[tokio::test]
async fn filtered_build_sends_nothing() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config("status == FAILURE", &receiver.url(), "x"))
        .await
        .unwrap();

    let event = Build::new("b-1", BuildStatus::Success).with_log_url("https://x/log");
    let outcome = notifier.handle(&RequestContext::new(), &event).await.unwrap();
    assert_eq!(outcome, HandleOutcome::Filtered);

    let notifier = notifier_for_success(&receiver).await;
    for status in [BuildStatus::Failure, BuildStatus::Working, BuildStatus::Cancelled] {
        let outcome = notifier
            .handle(&RequestContext::new(), &build("b-1", status))
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Filtered);
    }
    assert!(receiver.requests().is_empty());
}

#[tokio::test]
async fn server_error_response_is_still_ok() {
    let receiver = Receiver::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let notifier = notifier(&config(SUCCESS_FILTER, &receiver.url(), "Build {{.Build.Id}}"))
        .await
        .unwrap();

    let outcome = notifier
        .handle(&RequestContext::new(), &build("b-1", BuildStatus::Success))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        HandleOutcome::Delivered {
            status: StatusCode::INTERNAL_SERVER_ERROR
        }
    );
    assert_eq!(receiver.requests().len(), 1);
}

#[tokio::test]
async fn non_ok_response_logs_a_warning() {
    let failing = Receiver::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let to_failing = notifier(&config("true", &failing.url(), "x")).await.unwrap();
    let healthy = Receiver::start(StatusCode::OK).await;
    let to_healthy = notifier(&config("true", &healthy.url(), "x")).await.unwrap();

    let logs = LogCapture::default();
    let guard = logs.set_default();
    to_failing
        .handle(&RequestContext::new(), &build("b-1", BuildStatus::Success))
        .await
        .unwrap();
    drop(guard);

    let warnings = logs.lines_at("WARN");
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains("non-OK response"), "{}", warnings[0]);
    assert!(warnings[0].contains("500"), "{}", warnings[0]);

    let logs = LogCapture::default();
    let guard = logs.set_default();
    to_healthy
        .handle(&RequestContext::new(), &build("b-2", BuildStatus::Success))
        .await
        .unwrap();
    drop(guard);

    assert!(logs.lines_at("WARN").is_empty(), "{}", logs.contents());
    assert!(logs.contents().contains("sent HTTP request successfully"));
}

#[tokio::test]
async fn temporary_redirect_is_followed() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config("true", &receiver.moved_url(), "Build {{.Build.Id}}"))
        .await
        .unwrap();

    let outcome = notifier
        .handle(&RequestContext::new(), &build("b-3", BuildStatus::Success))
        .await
        .unwrap();
    assert_eq!(outcome, HandleOutcome::Delivered { status: StatusCode::OK });

    let requests = receiver.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].message(), "Build b-3");
}

#[tokio::test]
async fn message_carries_annotated_log_url() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config("true", &receiver.url(), "logs: {{.Build.LogUrl}}"))
        .await
        .unwrap();

    let event = build("b-2", BuildStatus::Failure);
    notifier.handle(&RequestContext::new(), &event).await.unwrap();

    assert_eq!(
        receiver.requests()[0].message(),
        "logs: https://ci.example.com/builds/b-2/log?utm_campaign=build-notifiers&utm_medium=http&utm_source=build-notifier"
    );
    assert_eq!(event.log_url, "https://ci.example.com/builds/b-2/log");
}

#[tokio::test]
async fn params_are_resolved_per_build() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config_with_params(
        "true",
        &receiver.url(),
        "{{.Params.project}}@{{.Params.branch}}",
        &[
            ("branch", "$(build.substitutions.BRANCH_NAME)"),
            ("project", "$(build.project_id)"),
        ],
    ))
    .await
    .unwrap();

    notifier
        .handle(&RequestContext::new(), &build("b-3", BuildStatus::Success))
        .await
        .unwrap();
    assert_eq!(receiver.requests()[0].message(), "demo-project@main");
}

#[tokio::test]
async fn missing_substitution_fails_before_delivery() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config_with_params(
        "true",
        &receiver.url(),
        "{{.Params.env}}",
        &[("env", "$(build.substitutions._DEPLOY_ENV)")],
    ))
    .await
    .unwrap();

    let err = notifier
        .handle(&RequestContext::new(), &build("b-4", BuildStatus::Success))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BindingResolution(_)), "{err}");
    assert!(receiver.requests().is_empty());
}

#[tokio::test]
async fn render_failure_sends_nothing() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config("true", &receiver.url(), "{{.Params.unset}}"))
        .await
        .unwrap();

    let err = notifier
        .handle(&RequestContext::new(), &build("b-5", BuildStatus::Success))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TemplateExec(_)), "{err}");
    assert!(receiver.requests().is_empty());
}

#[tokio::test]
async fn malformed_log_url_sends_nothing() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config("true", &receiver.url(), "x")).await.unwrap();

    let event = build("b-6", BuildStatus::Success).with_log_url("http://[::1/log");
    let err = notifier
        .handle(&RequestContext::new(), &event)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UrlMalformed { .. }), "{err}");
    assert!(receiver.requests().is_empty());
}

#[tokio::test]
async fn relative_log_url_is_annotated_and_sent() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config("true", &receiver.url(), "{{.Build.LogUrl}}"))
        .await
        .unwrap();

    for (log_url, expected) in [
        ("", "?utm_campaign=build-notifiers&utm_medium=http&utm_source=build-notifier"),
        (
            "/builds/b-7/log",
            "/builds/b-7/log?utm_campaign=build-notifiers&utm_medium=http&utm_source=build-notifier",
        ),
    ] {
        let event = build("b-7", BuildStatus::Success).with_log_url(log_url);
        let outcome = notifier.handle(&RequestContext::new(), &event).await.unwrap();
        assert!(outcome.is_delivered());
        assert_eq!(receiver.requests().last().unwrap().message(), expected);
    }
    assert_eq!(receiver.requests().len(), 2);
}

#[tokio::test]
async fn literal_template_is_sent_verbatim() {
    let literal = "Deploy finished.\n\"quoted\" and \\ backslash\ttab";
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config("true", &receiver.url(), literal)).await.unwrap();

    notifier
        .handle(&RequestContext::new(), &build("b-7", BuildStatus::Success))
        .await
        .unwrap();
    assert_eq!(receiver.requests()[0].message(), literal);
}

#[tokio::test]
async fn json_shaped_message_is_still_a_string() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = notifier(&config(
        "true",
        &receiver.url(),
        r#"{"id": "{{.Build.Id}}", "status": "{{.Build.Status}}"}"#,
    ))
    .await
    .unwrap();

    notifier
        .handle(&RequestContext::new(), &build("b-8", BuildStatus::Timeout))
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&receiver.requests()[0].body).unwrap();
    assert_eq!(
        body,
        serde_json::Value::String(r#"{"id": "b-8", "status": "TIMEOUT"}"#.into())
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() {
    let notifier = notifier(&config("true", &closed_url().await, "x"))
        .await
        .unwrap();

    let err = notifier
        .handle(&RequestContext::new(), &build("b-9", BuildStatus::Success))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeliveryTransport(_)), "{err}");
}

#[tokio::test]
async fn slow_endpoint_hits_deadline() {
    let receiver = Receiver::start_with_delay(StatusCode::OK, Duration::from_secs(30)).await;
    let notifier = notifier(&config("true", &receiver.url(), "x")).await.unwrap();

    let ctx = RequestContext::new().with_timeout(Duration::from_millis(200));
    let err = notifier
        .handle(&ctx, &build("b-10", BuildStatus::Success))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Cancelled(ContextError::DeadlineExceeded)),
        "{err}"
    );
}

#[tokio::test]
async fn cancellation_aborts_in_flight_delivery() {
    let receiver = Receiver::start_with_delay(StatusCode::OK, Duration::from_secs(30)).await;
    let notifier = notifier(&config("true", &receiver.url(), "x")).await.unwrap();

    let ctx = RequestContext::new();
    let token = ctx.cancellation_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let err = notifier
        .handle(&ctx, &build("b-11", BuildStatus::Success))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(ContextError::Cancelled)), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_handles_each_deliver_once() {
    let receiver = Receiver::start(StatusCode::OK).await;
    let notifier = Arc::new(
        notifier(&config(SUCCESS_FILTER, &receiver.url(), "{{.Build.Id}}"))
            .await
            .unwrap(),
    );

    let mut tasks = Vec::new();
    for i in 0..16 {
        let notifier = notifier.clone();
        let status = if i % 2 == 0 {
            BuildStatus::Success
        } else {
            BuildStatus::Failure
        };
        tasks.push(tokio::spawn(async move {
            notifier
                .handle(&RequestContext::new(), &build(&format!("b-{i}"), status))
                .await
        }));
    }

    let mut delivered = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().is_delivered() {
            delivered += 1;
        }
    }
    assert_eq!(delivered, 8);

    let mut ids: Vec<String> = receiver.requests().iter().map(|r| r.message()).collect();
    ids.sort();
    let mut expected: Vec<String> = (0..16).step_by(2).map(|i| format!("b-{i}")).collect();
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn setup_fails_on_malformed_filter() {
    let err = notifier(&config("build.status == ", "http://localhost/hook", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FilterCompile(_)), "{err}");
}

#[tokio::test]
async fn setup_fails_on_unknown_field() {
    let err = notifier(&config("build.colour == \"red\"", "http://localhost/hook", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FilterCompile(_)), "{err}");
}

#[tokio::test]
async fn setup_fails_without_url() {
    let mut config = config("true", "http://localhost/hook", "x");
    config.spec.notification.delivery.remove("url");
    let err = notifier(&config).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{err}");
}

#[tokio::test]
async fn setup_fails_on_non_string_url() {
    let mut config = config("true", "http://localhost/hook", "x");
    config
        .spec
        .notification
        .delivery
        .insert("url".into(), serde_json::json!(["http://a", "http://b"]));
    let err = notifier(&config).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{err}");
}

#[tokio::test]
async fn setup_fails_on_bad_template() {
    let err = notifier(&config("true", "http://localhost/hook", "{{range .Build.Tags}}"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TemplateParse(_)), "{err}");
}

#[tokio::test]
async fn bundled_example_config_sets_up() {
    use http_notifier::bindings::SecretGetter;
    use http_notifier::{NotifierConfig, ParamsBindingResolver};

    struct Fixed;

    #[async_trait::async_trait]
    impl SecretGetter for Fixed {
        async fn get_secret(&self, reference: &str) -> http_notifier::Result<String> {
            assert_eq!(reference, "HOOK_TOKEN");
            Ok("tok".into())
        }
    }

    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let config = NotifierConfig::load(dir.join("example.yaml")).unwrap();
    let template = config.template_source(Some(&dir)).unwrap();
    let ctx = RequestContext::new();
    let resolver = ParamsBindingResolver::from_config(&ctx, &config, &Fixed)
        .await
        .unwrap();
    let notifier = HttpNotifier::setup(&ctx, &config, &template, &Fixed, Arc::new(resolver))
        .await
        .unwrap();
    assert_eq!(
        notifier.destination().as_str(),
        "https://hooks.example.com/builds/tok"
    );
    let outcome = notifier
        .handle(&RequestContext::new(), &build("b-1", BuildStatus::Working))
        .await
        .unwrap();
    assert_eq!(outcome, HandleOutcome::Filtered);
}

//! Global and toggle budgets through the full middleware stack.

mod common;

use std::time::Duration;

use axum::http::{header, StatusCode};
use common::*;
use lha_core::config::WindowSettings;
use lha_core::RelayConfig;

const ALICE: [u8; 4] = [10, 0, 0, 7];
const BOB: [u8; 4] = [10, 0, 0, 8];

fn budgets(global: u32, toggle: u32) -> RelayConfig {
    let mut config = test_config();
    config.rate_limit.global = WindowSettings {
        max_requests: global,
        window_secs: 60,
    };
    config.rate_limit.toggle = WindowSettings {
        max_requests: toggle,
        window_secs: 60,
    };
    config
}

#[tokio::test(start_paused = true)]
async fn test_toggle_budget_rejects_and_recovers() {
    let publisher = SpyPublisher::new(Behaviour::Acknowledge);
    let state = state_with(budgets(100, 3), publisher.clone());
    let token = token();

    for _ in 0..3 {
        let (status, _, _) = send(router_for(&state, ALICE), toggle_request("/garage/left", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, headers, body) = send(router_for(&state, ALICE), toggle_request("/garage/left", Some(&token))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert_eq!(body["retry_after"], 60);
    assert_eq!(headers[header::RETRY_AFTER], "60");
    assert_eq!(publisher.calls(), 3);

    tokio::time::advance(Duration::from_secs(60)).await;
    let (status, _, _) = send(router_for(&state, ALICE), toggle_request("/garage/left", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(publisher.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_budgets_are_per_client() {
    let state = state_with(budgets(100, 1), SpyPublisher::new(Behaviour::Acknowledge));
    let token = token();

    let (status, _, _) = send(router_for(&state, ALICE), toggle_request("/gate", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(router_for(&state, ALICE), toggle_request("/gate", Some(&token))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _, _) = send(router_for(&state, BOB), toggle_request("/gate", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_unauthenticated_requests_do_not_spend_toggle_budget() {
    let publisher = SpyPublisher::new(Behaviour::Acknowledge);
    let state = state_with(budgets(100, 2), publisher.clone());
    let token = token();

    for _ in 0..5 {
        let (status, _, _) = send(router_for(&state, ALICE), toggle_request("/garage/left", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    for _ in 0..2 {
        let (status, _, _) = send(router_for(&state, ALICE), toggle_request("/garage/left", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(publisher.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_global_budget_covers_public_route() {
    let state = state_with(budgets(2, 10), SpyPublisher::new(Behaviour::Acknowledge));

    for _ in 0..2 {
        let (status, _, _) = send(router_for(&state, ALICE), get_request("/")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, body) = send(router_for(&state, ALICE), get_request("/")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
}

#[tokio::test(start_paused = true)]
async fn test_global_budget_checked_before_credential() {
    let publisher = SpyPublisher::new(Behaviour::Acknowledge);
    let state = state_with(budgets(2, 10), publisher.clone());
    let token = token();

    for _ in 0..2 {
        let (status, _, _) = send(router_for(&state, ALICE), toggle_request("/gate", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Valid credential, but the global window is already spent.
    let (status, _, _) = send(router_for(&state, ALICE), toggle_request("/gate", Some(&token))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_requests_count_against_global_budget() {
    let state = state_with(budgets(3, 10), SpyPublisher::new(Behaviour::Acknowledge));
    let token = token();

    for _ in 0..3 {
        let (status, _, _) = send(router_for(&state, ALICE), toggle_request("/gate", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, _) = send(router_for(&state, ALICE), get_request("/")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

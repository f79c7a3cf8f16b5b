//! Session lifecycle against a scripted card

mod common;

use std::time::Duration;

use common::{CARD_ID, CardReply, MockDelegate, MockTransport, WalletRecord, empty_wallets_reply};
use tapcard::apdu::{Bytes, ResponseApdu, TransportError};
use tapcard::crypto::sha256;
use tapcard::operations::Read;
use tapcard::tasks::ScanTask;
use tapcard::tlv::TlvTag;
use tapcard::{Config, Error, UserCode, UserCodeType};

#[tokio::test]
async fn test_scan_reads_card_and_wallets() {
    let transport = MockTransport::new();
    common::preflight(
        &transport,
        &[
            WalletRecord::loaded(0, vec![0x02; 33]),
            WalletRecord::empty(1),
            WalletRecord::empty(2),
        ],
    );
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let card = session.run(&mut ScanTask::new()).await.unwrap();

    assert_eq!(card.card_id, CARD_ID);
    assert_eq!(card.settings.max_wallets_count, 3);
    assert_eq!(card.wallets.len(), 1);
    assert_eq!(card.wallets[0].public_key, vec![0x02; 33]);
    assert_eq!(transport.instructions(), vec![0xF2, 0xF2]);
    assert_eq!(transport.stopped(), Some(false));
    assert_eq!(
        delegate.events(),
        vec!["session_started", "tag_connected", "session_stopped"]
    );
}

#[tokio::test]
async fn test_legacy_card_skips_wallets_list() {
    let transport = MockTransport::new();
    transport.ok(
        CardReply::new()
            .firmware("2.30r")
            .legacy_wallet(vec![0x04; 65])
            .build(),
    );
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let card = session.run(&mut ScanTask::new()).await.unwrap();

    assert_eq!(card.wallets.len(), 1);
    assert_eq!(card.wallets[0].index, 0);
    assert_eq!(transport.instructions(), vec![0xF2]);
}

#[tokio::test]
async fn test_wrong_card_is_rejected() {
    let transport = MockTransport::new();
    transport.ok(CardReply::new().build());
    let delegate = MockDelegate::new();
    let mut session =
        common::session(&transport, &delegate, Config::default()).with_card_id("BB03000000001234");

    let error = session.run(&mut ScanTask::new()).await.unwrap_err();

    assert_eq!(error, Error::WrongCardNumber("BB03000000001234".to_string()));
    assert_eq!(delegate.count("wrong_card"), 1);
    assert_eq!(delegate.count("error 50005"), 1);
    assert_eq!(transport.pending(), 0);
}

#[tokio::test]
async fn test_card_id_match_ignores_case() {
    let transport = MockTransport::new();
    transport.ok(CardReply::new().build()).ok(empty_wallets_reply());
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default())
        .with_card_id(CARD_ID.to_lowercase());

    let card = session.run(&mut ScanTask::new()).await.unwrap();
    assert_eq!(card.card_id, CARD_ID);
}

#[tokio::test]
async fn test_access_code_prompt_retries_read() {
    let transport = MockTransport::new();
    transport
        .status(0x6AF1)
        .ok(CardReply::new().build())
        .ok(empty_wallets_reply());
    let delegate = MockDelegate::with_codes(&[Some("123456")]);
    let mut session = common::session(&transport, &delegate, Config::default());

    session.run(&mut ScanTask::new()).await.unwrap();

    assert_eq!(delegate.count("request_user_code AccessCode true"), 1);
    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(
        common::request_value(&sent[0], TlvTag::Pin),
        Some(sha256(b"000000").to_vec())
    );
    assert_eq!(
        common::request_value(&sent[1], TlvTag::Pin),
        Some(sha256(b"123456").to_vec())
    );
}

#[tokio::test]
async fn test_cancelled_prompt_ends_session() {
    let transport = MockTransport::new();
    transport.status(0x6AF1);
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let error = session.run(&mut ScanTask::new()).await.unwrap_err();

    assert_eq!(error, Error::UserCancelled);
    assert_eq!(transport.stopped(), Some(true));
    assert_eq!(delegate.count("error"), 0);
    assert_eq!(delegate.count("session_stopped"), 1);
}

#[tokio::test]
async fn test_cancelled_prompt_keeps_current_code() {
    let transport = MockTransport::new();
    transport.status(0x6AF1);
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default())
        .with_access_code("123456");

    let error = session.run(&mut ScanTask::new()).await.unwrap_err();

    assert_eq!(error, Error::UserCancelled);
    assert_eq!(delegate.count("request_user_code AccessCode false"), 1);
    assert_eq!(transport.pauses(), 1);
    assert!(!transport.is_paused());
    assert_eq!(
        session.environment().access_code,
        UserCode::new(UserCodeType::AccessCode, "123456")
    );
    assert!(session.environment().is_user_code_set(UserCodeType::AccessCode));
}

#[tokio::test]
async fn test_status_error_keeps_status_word() {
    let transport = MockTransport::new();
    transport.status(0x6985);
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let error = session.run(&mut Read::new()).await.unwrap_err();

    assert_eq!(error.kind(), &Error::InvalidState);
    assert_eq!(error.status_word(), Some(0x6985));
    assert_eq!(error.code(), 30003);
    assert_eq!(delegate.count("error 30003"), 1);
}

#[tokio::test]
async fn test_security_delay_resends_request() {
    let transport = MockTransport::new();
    transport
        .reply(ResponseApdu::new(
            Bytes::from_static(&[0x1C, 0x02, 0x05, 0xDC]),
            0x9789,
        ))
        .reply(ResponseApdu::new(
            Bytes::from_static(&[0x1C, 0x02, 0x01, 0xF4]),
            0x9789,
        ))
        .ok(CardReply::new().build());
    let delegate = MockDelegate::new();
    let config = Config::default().with_need_pause_interval(Duration::from_millis(1));
    let mut session = common::session(&transport, &delegate, config);

    let response = session.run(&mut Read::new()).await.unwrap();

    assert_eq!(response.card_id, CARD_ID);
    assert_eq!(delegate.count("security_delay 1500"), 1);
    assert_eq!(delegate.count("security_delay 500"), 1);

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|apdu| apdu == &sent[0]));
}

#[tokio::test]
async fn test_tag_lost_is_reported() {
    let transport = MockTransport::new();
    transport.fail(TransportError::TagLost);
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let error = session.run(&mut ScanTask::new()).await.unwrap_err();

    assert_eq!(error, Error::TagLost);
    assert_eq!(delegate.count("tag_lost"), 1);
    assert_eq!(delegate.count("error 10001"), 1);
    assert_eq!(transport.stopped(), Some(false));
}

#[tokio::test]
async fn test_cancellation_aborts_pending_exchange() {
    let transport = MockTransport::new();
    transport.hang();
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());
    let handle = session.cancellation_handle();

    let mut scan = ScanTask::new();
    let (result, ()) = tokio::join!(session.run(&mut scan), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    });

    assert_eq!(result.unwrap_err(), Error::UserCancelled);
    assert!(handle.is_cancelled());
    assert_eq!(transport.stopped(), Some(true));
}

#[tokio::test]
async fn test_session_can_run_again() {
    let transport = MockTransport::new();
    for _ in 0..2 {
        transport.ok(CardReply::new().build()).ok(empty_wallets_reply());
    }
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    session.run(&mut ScanTask::new()).await.unwrap();
    session.run(&mut ScanTask::new()).await.unwrap();

    assert_eq!(delegate.count("session_started"), 2);
    assert_eq!(transport.pending(), 0);
}

#[tokio::test]
async fn test_next_run_starts_from_initial_state() {
    let transport = MockTransport::new();
    transport
        .status(0x6AF1)
        .ok(CardReply::new().build())
        .ok(empty_wallets_reply())
        .ok(CardReply::new().build())
        .ok(empty_wallets_reply());
    let delegate = MockDelegate::with_codes(&[Some("123456")]);
    let mut session = common::session(&transport, &delegate, Config::default());

    session.run(&mut ScanTask::new()).await.unwrap();
    assert!(session.environment().is_user_code_set(UserCodeType::AccessCode));
    session.run(&mut ScanTask::new()).await.unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 5);
    assert_eq!(
        common::request_value(&sent[3], TlvTag::Pin),
        Some(sha256(b"000000").to_vec())
    );
    assert_eq!(delegate.count("request_user_code"), 1);
    assert!(!session.environment().is_user_code_set(UserCodeType::AccessCode));
}

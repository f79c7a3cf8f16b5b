//! File tasks: chunked writes, read-all and delete-all loops

mod common;

use common::{CARD_ID, CardReply, MockDelegate, MockTransport, WalletRecord};
use tapcard::apdu::Bytes;
use tapcard::crypto::sha256;
use tapcard::operations::{FileToWrite, FileVisibility};
use tapcard::tasks::{DeleteFilesTask, ReadFilesTask, WriteFilesTask};
use tapcard::tlv::{TlvBuilder, TlvTag};
use tapcard::{Config, Error};

fn empty_card(transport: &MockTransport) {
    common::preflight(
        transport,
        &[WalletRecord::empty(0), WalletRecord::empty(1), WalletRecord::empty(2)],
    );
}

fn file_index_reply(file_index: u8) -> Bytes {
    let mut tlv = TlvBuilder::new();
    tlv.append(TlvTag::CardId, CARD_ID)
        .unwrap()
        .append(TlvTag::FileIndex, &file_index)
        .unwrap();
    tlv.serialize().unwrap()
}

fn file_part_reply(file_index: u8, size: u16, data: &[u8], settings: Option<u8>) -> Bytes {
    let mut tlv = TlvBuilder::new();
    tlv.append(TlvTag::CardId, CARD_ID)
        .unwrap()
        .append(TlvTag::Size, &size)
        .unwrap()
        .append(TlvTag::IssuerData, data)
        .unwrap()
        .append(TlvTag::FileIndex, &file_index)
        .unwrap();
    if let Some(settings) = settings {
        tlv.append(TlvTag::FileSettings, &vec![settings]).unwrap();
    }
    tlv.serialize().unwrap()
}

#[tokio::test]
async fn test_write_file_in_parts() {
    let data: Vec<u8> = (0..1000u16).map(|i| i as u8).collect();
    let transport = MockTransport::new();
    empty_card(&transport);
    transport
        .ok(file_index_reply(3))
        .ok(common::card_id_reply())
        .ok(common::card_id_reply())
        .ok(common::card_id_reply());
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let response = session
        .run(&mut WriteFilesTask::new(vec![
            FileToWrite::new(data.clone()).with_visibility(FileVisibility::Public),
        ]))
        .await
        .unwrap();

    assert_eq!(response.card_id, CARD_ID);
    assert_eq!(response.files_indices, vec![3]);
    assert_eq!(delegate.count("delay"), 2);
    assert_eq!(delegate.count("delay 0/1000"), 1);
    assert_eq!(delegate.count("delay 900/1000"), 1);

    let sent = transport.sent();
    assert_eq!(sent.len(), 6);
    assert!(sent[2..].iter().all(|apdu| apdu.instruction() == 0xD0));
    assert_eq!(
        common::request_value(&sent[2], TlvTag::Size),
        Some(vec![0x03, 0xE8])
    );
    assert_eq!(
        common::request_value(&sent[3], TlvTag::IssuerData).map(|part| part.len()),
        Some(900)
    );
    assert_eq!(
        common::request_value(&sent[4], TlvTag::IssuerData),
        Some(data[900..].to_vec())
    );
    assert_eq!(common::request_value(&sent[4], TlvTag::FileIndex), Some(vec![3]));
    assert_eq!(
        common::request_value(&sent[5], TlvTag::CodeHash),
        Some(sha256(&data).to_vec())
    );
}

#[tokio::test]
async fn test_overwrite_deletes_existing_files_first() {
    let transport = MockTransport::new();
    empty_card(&transport);
    transport
        .ok(common::card_id_reply())
        .ok(common::card_id_reply())
        .status(0x6A82)
        .ok(file_index_reply(0))
        .ok(common::card_id_reply())
        .ok(common::card_id_reply());
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let response = session
        .run(&mut WriteFilesTask::new(vec![FileToWrite::new(b"note".to_vec())]).overwrite(true))
        .await
        .unwrap();

    assert_eq!(response.files_indices, vec![0]);
    let sent = transport.sent();
    assert_eq!(sent.len(), 8);
    for delete in &sent[2..5] {
        assert_eq!(common::request_value(delete, TlvTag::FileIndex), Some(vec![0]));
    }
    assert_eq!(transport.pending(), 0);
}

#[tokio::test]
async fn test_read_all_files_until_not_found() {
    let transport = MockTransport::new();
    empty_card(&transport);
    transport
        .ok(file_part_reply(0, 5, b"hello", Some(0x01)))
        .ok(file_part_reply(1, 0, b"", None))
        .status(0x6A82);
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let files = session.run(&mut ReadFilesTask::all()).await.unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_index, 0);
    assert_eq!(files[0].file_data, b"hello".to_vec());
    assert_eq!(
        files[0].file_settings.map(|settings| settings.visibility),
        Some(FileVisibility::Public)
    );

    let indices: Vec<_> = transport.sent()[2..]
        .iter()
        .map(|apdu| common::request_value(apdu, TlvTag::FileIndex))
        .collect();
    assert_eq!(indices, vec![Some(vec![0]), Some(vec![1]), Some(vec![2])]);
    assert!(
        transport.sent()[2..]
            .iter()
            .all(|apdu| common::request_value(apdu, TlvTag::Pin2).is_none())
    );
}

#[tokio::test]
async fn test_read_file_follows_offsets() {
    let transport = MockTransport::new();
    empty_card(&transport);
    transport
        .ok(file_part_reply(4, 10, b"abcdef", None))
        .ok(file_part_reply(4, 10, b"ghij", None));
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let files = session
        .run(&mut ReadFilesTask::with_indices(vec![4]).read_private(true))
        .await
        .unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_data, b"abcdefghij".to_vec());
    let sent = transport.sent();
    assert_eq!(common::request_value(&sent[2], TlvTag::Offset), Some(vec![0, 0]));
    assert_eq!(common::request_value(&sent[3], TlvTag::Offset), Some(vec![0, 6]));
    assert!(common::request_value(&sent[3], TlvTag::Pin2).is_some());
}

#[tokio::test]
async fn test_read_without_progress_fails() {
    let transport = MockTransport::new();
    empty_card(&transport);
    transport.ok(file_part_reply(0, 10, b"", None));
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let error = session
        .run(&mut ReadFilesTask::with_indices(vec![0]))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidResponse(_)));
}

#[tokio::test]
async fn test_delete_indices_highest_first() {
    let transport = MockTransport::new();
    empty_card(&transport);
    transport
        .ok(common::card_id_reply())
        .ok(common::card_id_reply());
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let response = session
        .run(&mut DeleteFilesTask::with_indices(vec![1, 3, 1]))
        .await
        .unwrap();

    assert_eq!(response.card_id, CARD_ID);
    let sent = transport.sent();
    assert_eq!(sent.len(), 4);
    assert_eq!(common::request_value(&sent[2], TlvTag::FileIndex), Some(vec![3]));
    assert_eq!(common::request_value(&sent[3], TlvTag::FileIndex), Some(vec![1]));
}

#[tokio::test]
async fn test_delete_all_on_card_without_files() {
    let transport = MockTransport::new();
    empty_card(&transport);
    transport.status(0x6A82);
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    session.run(&mut DeleteFilesTask::all()).await.unwrap();
    assert_eq!(transport.sent().len(), 3);
}

#[tokio::test]
async fn test_write_needs_recent_firmware() {
    let transport = MockTransport::new();
    transport.ok(
        CardReply::new()
            .firmware("3.29r")
            .legacy_wallet(vec![0x04; 65])
            .build(),
    );
    let delegate = MockDelegate::new();
    let mut session = common::session(&transport, &delegate, Config::default());

    let error = session
        .run(&mut WriteFilesTask::new(vec![FileToWrite::new(b"note".to_vec())]))
        .await
        .unwrap_err();

    assert_eq!(error, Error::NotSupportedFirmwareVersion);
    assert_eq!(transport.sent().len(), 1);
}

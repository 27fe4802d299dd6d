//! Интеграционные тесты кодека STOMP на потоке, похожем на ответы брокера.

use noticelink::bus::stomp::{Command, Frame, Incoming, StompDecoder, StompEncoder};
use noticelink::BusError;

/// Тест проверяет разбор типичного потока: CONNECTED, heart-beat и два
/// MESSAGE в одном фрагменте.
#[test]
fn test_broker_stream_in_one_chunk() {
    let stream = concat!(
        "CONNECTED\nversion:1.2\nheart-beat:10000,10000\n\n\0",
        "\n",
        "MESSAGE\ndestination:/user/queue/notice\nsubscription:sub-0\nmessage-id:1\n\n{\"id\":1}\0",
        "\r\n",
        "MESSAGE\ndestination:/topic/notice.user-7\nsubscription:sub-1\nmessage-id:2\ncontent-length:8\n\n{\"id\":2}\0",
    );

    let mut decoder = StompDecoder::new();
    let items = decoder.decode_all(stream).unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[1], Incoming::Heartbeat);
    assert_eq!(items[3], Incoming::Heartbeat);

    let Incoming::Frame(connected) = &items[0] else {
        panic!("expected CONNECTED, got {:?}", items[0]);
    };
    assert_eq!(connected.command, Command::Connected);
    assert_eq!(connected.get("heart-beat"), Some("10000,10000"));

    let Incoming::Frame(second) = &items[4] else {
        panic!("expected MESSAGE, got {:?}", items[4]);
    };
    assert_eq!(second.get("subscription"), Some("sub-1"));
    assert_eq!(second.body, "{\"id\":2}");
    assert_eq!(decoder.buffered(), 0);
}

/// Тест проверяет, что кадр, пришедший по одному символу, собирается.
#[test]
fn test_byte_by_byte_delivery() {
    let frame = Frame::new(Command::Message)
        .header("destination", "/topic/notice.user-1")
        .header("subscription", "sub-0")
        .with_body("{\"title\":\"Hi: there\"}");
    let text = StompEncoder::encode(&frame).unwrap();

    let mut decoder = StompDecoder::new();
    let mut decoded = Vec::new();
    for ch in text.chars() {
        decoded.extend(decoder.decode_all(&ch.to_string()).unwrap());
    }
    assert_eq!(decoded.len(), 1);
    let Incoming::Frame(out) = &decoded[0] else {
        panic!("expected frame");
    };
    assert_eq!(out.body, frame.body);
    assert_eq!(out.get("destination"), Some("/topic/notice.user-1"));
}

/// Тест проверяет точный текст SUBSCRIBE и экранирование заголовков.
#[test]
fn test_subscribe_wire_format() {
    let text = StompEncoder::encode(&Frame::subscribe("sub-3", "/topic/a:b")).unwrap();
    assert_eq!(
        text,
        "SUBSCRIBE\nid:sub-3\ndestination:/topic/a\\cb\nack:auto\n\n\0"
    );

    let mut decoder = StompDecoder::new();
    let items = decoder.decode_all(&text).unwrap();
    let Incoming::Frame(frame) = &items[0] else {
        panic!("expected frame");
    };
    assert_eq!(frame.get("destination"), Some("/topic/a:b"));
}

/// Тест проверяет, что после ошибки разбора декодер снова пригоден.
#[test]
fn test_decoder_recovers_after_error() {
    let mut decoder = StompDecoder::new();
    let err = decoder.decode_all("BOGUS\n\n\0").unwrap_err();
    assert!(matches!(err, BusError::InvalidCommand { .. }));
    assert_eq!(decoder.buffered(), 0);

    let items = decoder.decode_all("RECEIPT\nreceipt-id:1\n\n\0").unwrap();
    assert_eq!(items.len(), 1);
}

use super::*;

fn png() -> Attachment {
    Attachment::new(vec![0x89, b'P', b'N', b'G'], "image/png")
}

#[test]
fn begin_turn_records_user_turn_and_placeholder() {
    let mut session = ChatSession::new(SenderId("s".into()));
    session.set_attachment(png());

    let attachment = session.pending_attachment().cloned();
    let turn_id = session.begin_turn("ticket photo", attachment);

    assert_eq!(turn_id, TurnId(1));
    assert_eq!(session.history().len(), 1);
    let turn = session.history().last().expect("turn");
    assert_eq!(turn.content, "ticket photo");
    assert_eq!(turn.attachment, Some(png()));
    assert_eq!(session.messages().reply_for(turn_id), Some(&MessageBody::Thinking));
    assert_eq!(session.in_flight(), vec![TurnId(1)]);
}

#[test]
fn finishing_clears_only_the_consumed_attachment() {
    let mut session = ChatSession::new(SenderId("s".into()));
    session.set_attachment(png());
    let attachment = session.pending_attachment().cloned();
    let first = session.begin_turn("one", attachment);

    let replacement = Attachment::new(vec![1], "image/gif");
    session.set_attachment(replacement.clone());

    let in_flight = session.take_in_flight(first).expect("in flight");
    session.finish_turn(first, in_flight, MessageBody::Thinking, None);
    assert_eq!(session.pending_attachment(), Some(&replacement));

    let attachment = session.pending_attachment().cloned();
    let second = session.begin_turn("two", attachment);
    let in_flight = session.take_in_flight(second).expect("in flight");
    session.finish_turn(second, in_flight, MessageBody::Thinking, None);
    assert!(session.pending_attachment().is_none());
}

#[test]
fn cancel_attachment_empties_slot() {
    let mut session = ChatSession::new(SenderId("s".into()));
    session.set_attachment(png());
    assert_eq!(session.cancel_attachment(), Some(png()));
    assert!(session.pending_attachment().is_none());
    assert_eq!(session.cancel_attachment(), None);
}

#[test]
fn resolving_unknown_placeholder_is_a_no_op() {
    let mut list = MessageList::default();
    assert!(!list.resolve(TurnId(9), MessageBody::Thinking));
    assert!(list.is_empty());
}

#[tokio::test]
async fn load_attachment_reads_images_and_rejects_others() {
    let dir = std::env::temp_dir().join(format!("chat_attachment_test_{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.expect("dir");
    let image = dir.join("ticket.png");
    let text = dir.join("notes.txt");
    tokio::fs::write(&image, b"png-bytes").await.expect("write image");
    tokio::fs::write(&text, b"hello").await.expect("write text");

    let attachment = load_attachment(&image).await.expect("image attachment");
    assert_eq!(attachment.mime_type, "image/png");
    assert_eq!(attachment.data, b"png-bytes");

    let err = load_attachment(&text).await.expect_err("text rejected");
    assert!(matches!(err, AttachmentError::NotAnImage { ref mime_type, .. } if mime_type == "text/plain"));

    let err = load_attachment(dir.join("missing.jpg"))
        .await
        .expect_err("missing file");
    assert!(matches!(err, AttachmentError::Read { .. }));

    tokio::fs::remove_dir_all(&dir).await.expect("cleanup");
}

use std::{
    cell::RefCell,
    rc::Rc,
    sync::{Arc, Mutex},
    thread,
};

use flutter_tizen_embedder::prelude::*;

type Verdicts = Rc<RefCell<Vec<bool>>>;

/// Framework stand-in that queues replies for the test to release.
#[derive(Default)]
struct Framework {
    events: Mutex<Vec<(KeyEvent, Option<KeyReply>)>>,
    messages: Mutex<Vec<(serde_json::Value, ChannelReply)>>,
}

/// Delivery paths handed to the channel, sharing one framework.
struct Paths(Arc<Framework>);

impl KeyEventSink for Paths {
    fn send_key_event(&self, event: KeyEvent, reply: Option<KeyReply>) {
        self.0.events.lock().unwrap().push((event, reply));
    }
}

impl KeyMessageChannel for Paths {
    fn send(&self, message: Vec<u8>, reply: ChannelReply) {
        let message = serde_json::from_slice(&message).unwrap();
        self.0.messages.lock().unwrap().push((message, reply));
    }
}

impl Framework {
    fn take_event(&self) -> (KeyEvent, Option<KeyReply>) {
        self.events.lock().unwrap().remove(0)
    }

    fn take_message(&self) -> (serde_json::Value, ChannelReply) {
        self.messages.lock().unwrap().remove(0)
    }
}

fn setup() -> (KeyboardChannel, Arc<Framework>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let framework = Arc::new(Framework::default());
    let channel = KeyboardChannel::new(
        Box::new(Paths(framework.clone())),
        Box::new(Paths(framework.clone())),
    );
    (channel, framework)
}

fn press(key: &'static str, scan_code: u32, is_down: bool) -> RawKey<'static> {
    RawKey {
        key,
        string: Some(key),
        compose: None,
        modifiers: 0,
        scan_code,
        is_down,
    }
}

fn record(verdicts: &Verdicts) -> Box<dyn FnOnce(bool)> {
    let verdicts = verdicts.clone();
    Box::new(move |handled| verdicts.borrow_mut().push(handled))
}

#[test]
fn down_then_up_reports_combined_verdicts() {
    let (mut channel, framework) = setup();
    let verdicts = Verdicts::default();

    channel.send_key(press("a", 30, true), record(&verdicts));
    let (down, down_reply) = framework.take_event();
    let (down_message, down_message_reply) = framework.take_message();
    assert_eq!(down.event_type, KeyEventType::Down);
    assert_eq!(down.character.as_deref(), Some("a"));
    assert_eq!(down_message["type"], "keydown");
    assert_eq!(down_message["scanCode"], 30);

    down_reply.unwrap().reply(false);
    down_message_reply.reply(Some(br#"{"handled":false}"#));
    channel.process_replies();
    assert_eq!(*verdicts.borrow(), vec![false]);

    channel.send_key(press("a", 30, false), record(&verdicts));
    let (up, up_reply) = framework.take_event();
    let (up_message, up_message_reply) = framework.take_message();
    assert_eq!(up.event_type, KeyEventType::Up);
    assert_eq!(up.physical, down.physical);
    assert_eq!(up.logical, down.logical);
    assert_eq!(up.character, None);
    assert_eq!(up_message["type"], "keyup");

    up_reply.unwrap().reply(true);
    up_message_reply.reply(Some(br#"{"handled":false}"#));
    channel.process_replies();
    assert_eq!(*verdicts.borrow(), vec![false, true]);
    assert_eq!(channel.pending_count(), 0);
    assert!(channel.pressed_keys().is_empty());
}

#[test]
fn replies_from_other_threads_resolve_on_owner_thread() {
    let (mut channel, framework) = setup();
    let verdicts = Verdicts::default();

    for _ in 0..3 {
        channel.send_key(press("b", 0x38, true), record(&verdicts));
    }

    let answering = {
        let framework = framework.clone();
        thread::spawn(move || {
            for handled in [false, true, false] {
                let (_, reply) = framework.take_event();
                reply.unwrap().reply(handled);
                let (_, reply) = framework.take_message();
                reply.reply(Some(br#"{"handled":false}"#));
            }
        })
    };
    answering.join().unwrap();

    assert!(verdicts.borrow().is_empty());
    assert_eq!(channel.process_replies(), 6);
    assert_eq!(*verdicts.borrow(), vec![false, true, false]);
}

#[test]
fn orphan_release_is_swallowed() {
    let (mut channel, framework) = setup();
    let verdicts = Verdicts::default();

    channel.send_key(press("a", 0x26, false), record(&verdicts));

    assert_eq!(*verdicts.borrow(), vec![true]);
    let (event, reply) = framework.take_event();
    assert!(event.is_empty());
    assert!(reply.is_none());
    assert!(framework.messages.lock().unwrap().is_empty());
}

#[test]
fn keyboard_state_follows_presses() {
    let (mut channel, framework) = setup();
    channel.send_key(press("Shift_L", 0x32, true), Box::new(|_| {}));
    channel.send_key(press("a", 0x26, true), Box::new(|_| {}));
    channel.send_key(press("Shift_L", 0x32, false), Box::new(|_| {}));

    let state = channel.handle_method_call("getKeyboardState").unwrap();
    assert_eq!(state, serde_json::json!({ "458756": 0x61 }));
    assert_eq!(framework.events.lock().unwrap().len(), 3);
}

use framebus::EventKey;
use framebus_macros::event_key;

#[event_key]
#[derive(PartialOrd, Ord, Debug)]
#[allow(dead_code)]
enum InputEvent {
    #[event_key(name = "input.move")]
    Move,
    /// 跳跃
    Jump = 10,
}

fn main() {
    assert_eq!(InputEvent::Move.name(), "input.move");
    assert_eq!(InputEvent::Jump.name(), "Jump");
    assert_eq!(InputEvent::from_name("INPUT.MOVE"), Some(InputEvent::Move));
    assert_eq!(InputEvent::all(), &[InputEvent::Move, InputEvent::Jump]);
    assert!(InputEvent::Move < InputEvent::Jump);
}

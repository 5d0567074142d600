use framebus::EventKey;
use framebus_macros::event_key;

#[event_key]
enum UiEvent {
    PanelOpen,
    PanelClose,
    StartClick,
}

fn main() {
    assert_eq!(UiEvent::all().len(), 3);
    assert_eq!(UiEvent::PanelClose.name(), "PanelClose");
    assert_eq!(UiEvent::from_name("startclick"), Some(UiEvent::StartClick));
    assert_eq!(UiEvent::PanelOpen.to_string(), "PanelOpen");

    let copied = UiEvent::PanelOpen;
    let again = copied;
    assert_eq!(copied, again);
}

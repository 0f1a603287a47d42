use parking_lot::Mutex;

/// One-shot message carried across a navigation
///
/// The message is handed out by `take` exactly once and is never replayed.
#[derive(Debug, Default)]
pub struct FlashSlot {
    message: Mutex<Option<String>>,
}

impl FlashSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a message, replacing any that was never taken
    pub fn put(&self, message: impl Into<String>) {
        *self.message.lock() = Some(message.into());
    }

    pub fn take(&self) -> Option<String> {
        self.message.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.message.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SIGNUP_SUCCESS_MESSAGE;

    #[test]
    fn test_message_is_taken_once() {
        let flash = FlashSlot::new();
        assert!(flash.is_empty());

        flash.put(SIGNUP_SUCCESS_MESSAGE);
        assert_eq!(flash.take().as_deref(), Some(SIGNUP_SUCCESS_MESSAGE));
        assert_eq!(flash.take(), None);
    }

    #[test]
    fn test_latest_message_wins() {
        let flash = FlashSlot::new();
        flash.put("first");
        flash.put("second");
        assert_eq!(flash.take().as_deref(), Some("second"));
    }
}

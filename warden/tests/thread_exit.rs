use std::cell::RefCell;
use std::sync::mpsc::{self, Sender};
use std::thread;
use warden::{Error, hazard_pointer, registry};

struct Late;

/// Asks for a hazard pointer from its destructor and reports the outcome.
struct Reporter(Sender<Result<usize, Error>>);

impl Drop for Reporter {
    fn drop(&mut self) {
        let _ = self.0.send(hazard_pointer::<Late>().map(|hazard| hazard.slot()));
    }
}

thread_local! {
    static REPORTER: RefCell<Option<Reporter>> = const { RefCell::new(None) };
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_hazard_pointer_requested_during_thread_exit() {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        // Registered before the owner list, so usually destroyed after it.
        REPORTER.with(|reporter| *reporter.borrow_mut() = Some(Reporter(tx)));
        hazard_pointer::<Late>().unwrap();
    })
    .join()
    .unwrap();

    // Destructor order is up to the platform; either way the call returns
    // instead of panicking and the slot ends up released.
    let result = rx.recv().unwrap();
    assert!(
        matches!(result, Ok(_) | Err(Error::ThreadExiting)),
        "{result:?}"
    );
    assert_eq!(registry::<Late>().in_use(), 0);
}

#[test]
fn test_thread_exiting_message() {
    assert_eq!(
        Error::ThreadExiting.to_string(),
        "hazard pointers unavailable: thread is exiting"
    );
}

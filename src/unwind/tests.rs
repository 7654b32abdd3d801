//! Unwind tests - LIFO recovery points, cleanup ordering, jump semantics

use super::*;
use std::cell::RefCell;
use std::rc::Rc;

fn fake_value(tag: usize) -> ObjPtr {
    // Thrown values are opaque to this layer; any distinct address works.
    (0x2000 + tag * 0x10) as ObjPtr
}

fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let make = {
        let log = Rc::clone(&log);
        move |name: &'static str| -> Box<dyn FnOnce()> {
            let log = Rc::clone(&log);
            Box::new(move || log.borrow_mut().push(name))
        }
    };
    (log, make)
}

#[test]
fn enter_leave_balances_depth() {
    let mut unwind = UnwindStack::new();
    let a = unwind.enter();
    let b = unwind.enter();
    assert_eq!(unwind.depth(), 2);

    unwind.leave(b);
    unwind.leave(a);
    assert_eq!(unwind.depth(), 0);
}

#[test]
fn protect_completes_normally() {
    let mut unwind = UnwindStack::new();
    let result = unwind.protect(|_| Ok::<_, Thrown>(42));
    assert_eq!(result.expect("no outer jump"), Protected::Completed(42));
    assert_eq!(unwind.depth(), 0);
}

#[test]
fn protect_catches_throw_to_innermost() {
    let mut unwind = UnwindStack::new();
    let value = fake_value(1);

    let result = unwind.protect(|u| -> Result<(), Thrown> { Err(u.throw(value)) });

    assert_eq!(result.expect("targeted here"), Protected::Caught(value));
    assert_eq!(unwind.depth(), 0);
}

#[test]
fn jump_to_outer_frame_passes_through_inner_protect() {
    let mut unwind = UnwindStack::new();
    let value = fake_value(2);
    let outer = unwind.enter();

    let result = unwind.protect(|u| -> Result<(), Thrown> { Err(u.jump(outer, value)) });

    // The inner frame was discarded by the jump; the token travels on.
    let thrown = result.expect_err("targeted outside the protect frame");
    assert_eq!(thrown.value(), value);
    assert_eq!(unwind.depth(), 1); // outer restored as top
    unwind.leave(outer);
}

#[test]
fn jump_runs_cleanups_innermost_first_exactly_once() {
    let mut unwind = UnwindStack::new();
    let (log, cleanup) = recorder();

    let a = unwind.enter();
    unwind.register_cleanup(cleanup("c1"));
    let _b = unwind.enter();
    unwind.register_cleanup(cleanup("c2"));

    let thrown = unwind.jump(a, fake_value(3));

    assert_eq!(*log.borrow(), vec!["c2", "c1"]);
    assert_eq!(unwind.cleanup_depth(), 0);
    assert_eq!(unwind.depth(), 1);
    assert_eq!(thrown.value(), fake_value(3));
    unwind.leave(a);
}

#[test]
fn cleanups_of_outer_scopes_survive_a_jump() {
    let mut unwind = UnwindStack::new();
    let (log, cleanup) = recorder();

    unwind.register_cleanup(cleanup("outer"));
    let a = unwind.enter();
    unwind.register_cleanup(cleanup("inner"));

    let _thrown = unwind.jump(a, fake_value(4));

    assert_eq!(*log.borrow(), vec!["inner"]);
    assert_eq!(unwind.cleanup_depth(), 1);
    unwind.leave(a);
    unwind.pop_cleanup(true);
    assert_eq!(*log.borrow(), vec!["inner", "outer"]);
}

#[test]
fn pop_cleanup_runs_only_when_asked() {
    let mut unwind = UnwindStack::new();
    let (log, cleanup) = recorder();

    unwind.register_cleanup(cleanup("kept"));
    unwind.register_cleanup(cleanup("skipped"));

    unwind.pop_cleanup(false);
    assert!(log.borrow().is_empty());

    unwind.pop_cleanup(true);
    assert_eq!(*log.borrow(), vec!["kept"]);
    assert_eq!(unwind.cleanup_depth(), 0);
}

#[test]
fn run_cleanups_above_stops_at_reference_frame() {
    let mut unwind = UnwindStack::new();
    let (log, cleanup) = recorder();

    unwind.register_cleanup(cleanup("before"));
    let reference = unwind.enter();
    unwind.register_cleanup(cleanup("late1"));
    unwind.register_cleanup(cleanup("late2"));

    unwind.run_cleanups_above(reference);

    assert_eq!(*log.borrow(), vec!["late2", "late1"]);
    assert_eq!(unwind.cleanup_depth(), 1);
    unwind.leave(reference);
}

#[test]
fn nested_protect_catches_at_the_right_level() {
    let mut unwind = UnwindStack::new();
    let value = fake_value(5);

    let result = unwind.protect(|u| -> Result<i32, Thrown> {
        let inner = u.protect(|u| -> Result<i32, Thrown> { Err(u.throw(value)) })?;
        assert_eq!(inner, Protected::Caught(value));
        // Caught and handled; continue normally in the outer frame.
        Ok(7)
    });

    assert_eq!(result.expect("no outer jump"), Protected::Completed(7));
    assert_eq!(unwind.depth(), 0);
}

#[test]
#[should_panic(expected = "unmatched non-local jump target")]
fn jump_to_dead_frame_is_fatal() {
    let mut unwind = UnwindStack::new();
    let a = unwind.enter();
    unwind.leave(a);
    let _ = unwind.jump(a, fake_value(6));
}

#[test]
#[should_panic(expected = "throw with no active recovery point")]
fn throw_without_frame_is_fatal() {
    let mut unwind = UnwindStack::new();
    let _ = unwind.throw(fake_value(7));
}

#[test]
#[should_panic(expected = "leave of non-top recovery point")]
fn leave_of_non_top_is_reported() {
    let mut unwind = UnwindStack::new();
    let a = unwind.enter();
    let _b = unwind.enter();
    unwind.leave(a);
}

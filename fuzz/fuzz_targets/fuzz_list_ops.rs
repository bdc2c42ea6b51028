#![no_main]

//! Drives a `BindableList` with arbitrary operations, including suspension
//! and reads from inside delivery, and checks it against a `Vec`.

use std::cell::Cell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use bindkit_collections::BindableList;
use bindkit_core::{Bindable, Dispatcher};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Push(u8),
    Insert(u8, u8),
    Set(u8, u8),
    RemoveAt(u8),
    RemoveRange(u8, u8),
    AddRange(Vec<u8>),
    RawSet(u8, u8),
    PublishAt(u8),
    Clear,
    Suspend,
    Resume(bool),
}

fuzz_target!(|ops: Vec<Op>| {
    let d = Dispatcher::new();
    let list = Rc::new(BindableList::<u8>::in_dispatcher(&d));
    let observed = Rc::new(Cell::new(0usize));
    let o = Rc::clone(&observed);
    let weak = Rc::downgrade(&list);
    list.subscribe(move |_| {
        // Reading back inside delivery must not hit a held borrow.
        if let Some(list) = weak.upgrade() {
            o.set(list.len());
        }
    });

    let mut m = Vec::<u8>::new();
    for op in ops.iter().take(256) {
        match *op {
            Op::Push(v) => {
                list.push(v);
                m.push(v);
            }
            Op::Insert(i, v) => {
                let i = usize::from(i);
                if list.insert(i, v).is_ok() {
                    m.insert(i, v);
                }
            }
            Op::Set(i, v) | Op::RawSet(i, v) => {
                let i = usize::from(i);
                let ok = if matches!(op, Op::Set(..)) {
                    list.set(i, v).is_ok()
                } else {
                    list.raw_set(i, v).is_ok()
                };
                if ok {
                    m[i] = v;
                }
            }
            Op::RemoveAt(i) => {
                let i = usize::from(i);
                if list.remove_at(i).is_ok() {
                    m.remove(i);
                }
            }
            Op::RemoveRange(s, c) => {
                let (s, c) = (usize::from(s), usize::from(c));
                if list.remove_range(s, c).is_ok() {
                    m.drain(s..s + c);
                }
            }
            Op::AddRange(ref items) => {
                list.add_range(items.iter().copied());
                m.extend(items);
            }
            Op::PublishAt(i) => {
                let _ = list.publish_at(usize::from(i));
            }
            Op::Clear => {
                list.clear();
                m.clear();
            }
            Op::Suspend => list.set_notify(false, false),
            Op::Resume(flush) => list.set_notify(true, flush),
        }
        assert_eq!(list.to_vec(), m);
        assert_eq!(d.publish_depth(), 0);
    }
    assert!(d.pool_stats().is_balanced());
});

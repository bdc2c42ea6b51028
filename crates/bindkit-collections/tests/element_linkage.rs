//! Parent links between containers and bindable elements.

use std::cell::RefCell;
use std::rc::Rc;

use bindkit_collections::{BindableDictionary, BindableList};
use bindkit_core::{
    Bindable, Bindings, ChangeKind, Dispatcher, MemberKey, Payload, Property, Value,
};

struct Item {
    bindings: Bindings,
    level: Property<u32>,
}

impl Item {
    fn new(d: &Dispatcher, level: u32) -> Rc<Self> {
        let bindings = Bindings::in_dispatcher(d);
        Rc::new(Self {
            level: Property::new(&bindings, "level", level),
            bindings,
        })
    }
}

impl Bindable for Item {
    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn member_value(&self, member: &MemberKey) -> Option<Value> {
        (member.name() == Some("level")).then(|| self.level.value_any())
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.bindings.owner() == other.bindings.owner()
    }
}

fn record(target: &impl Bindable) -> Rc<RefCell<Vec<(ChangeKind, bool)>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let e = Rc::clone(&events);
    target.subscribe(move |p: &Payload| e.borrow_mut().push((p.kind(), p.is_bubbled())));
    events
}

#[test]
fn added_elements_bubble_into_list() {
    let d = Dispatcher::new();
    let list: BindableList<Rc<Item>> = BindableList::linked_in(&d);
    let item = Item::new(&d, 1);
    list.push(Rc::clone(&item));
    assert_eq!(item.bindings().parent(), Some(list.bindings().all_members().id()));

    let events = record(&list);
    item.level.set(2);
    assert_eq!(*events.borrow(), vec![(ChangeKind::Publish, true)]);
}

#[test]
fn removed_elements_are_detached() {
    let d = Dispatcher::new();
    let list: BindableList<Rc<Item>> = BindableList::linked_in(&d);
    let item = Item::new(&d, 1);
    list.push(Rc::clone(&item));
    assert!(list.remove(&item));
    assert_eq!(item.bindings().parent(), None);

    let events = record(&list);
    item.level.set(5);
    assert!(events.borrow().is_empty());
}

#[test]
fn replace_swaps_links() {
    let d = Dispatcher::new();
    let list: BindableList<Rc<Item>> = BindableList::linked_in(&d);
    let first = Item::new(&d, 1);
    let second = Item::new(&d, 2);
    list.push(Rc::clone(&first));
    list.set(0, Rc::clone(&second)).unwrap();
    assert_eq!(first.bindings().parent(), None);
    assert_eq!(second.bindings().parent(), Some(list.bindings().all_members().id()));
}

#[test]
fn raw_mutators_still_link() {
    let d = Dispatcher::new();
    let list: BindableList<Rc<Item>> = BindableList::linked_in(&d);
    let events = record(&list);
    let item = Item::new(&d, 1);
    list.raw_push(Rc::clone(&item));
    assert!(events.borrow().is_empty());
    assert!(item.bindings().parent().is_some());

    list.raw_clear();
    assert!(events.borrow().is_empty());
    assert_eq!(item.bindings().parent(), None);
}

#[test]
fn suspended_list_still_links() {
    let d = Dispatcher::new();
    let list: BindableList<Rc<Item>> = BindableList::linked_in(&d);
    list.set_notify(false, false);
    let item = Item::new(&d, 1);
    list.push(Rc::clone(&item));
    assert!(item.bindings().parent().is_some());
}

#[test]
fn dictionary_links_values() {
    let d = Dispatcher::new();
    let dict: BindableDictionary<u32, Rc<Item>> = BindableDictionary::linked_in(&d);
    let a = Item::new(&d, 1);
    let b = Item::new(&d, 2);
    dict.insert(7, Rc::clone(&a));
    assert!(a.bindings().parent().is_some());

    dict.insert(7, Rc::clone(&b));
    assert_eq!(a.bindings().parent(), None);
    assert!(b.bindings().parent().is_some());

    dict.clear();
    assert_eq!(b.bindings().parent(), None);
}

#[test]
fn dictionary_reinsert_same_value_keeps_link() {
    let d = Dispatcher::new();
    let dict: BindableDictionary<u32, Rc<Item>> = BindableDictionary::linked_in(&d);
    let all = dict.bindings().all_members().id();
    let a = Item::new(&d, 1);
    dict.insert(7, Rc::clone(&a));

    dict.insert(7, Rc::clone(&a));
    assert_eq!(a.bindings().parent(), Some(all));

    dict.extend([(7, Rc::clone(&a))]);
    assert_eq!(a.bindings().parent(), Some(all));

    dict.remove(&7);
    assert_eq!(a.bindings().parent(), None);
}

#[test]
fn dictionary_extend_with_repeated_key_links_last_value() {
    let d = Dispatcher::new();
    let dict: BindableDictionary<u32, Rc<Item>> = BindableDictionary::linked_in(&d);
    let a = Item::new(&d, 1);
    let b = Item::new(&d, 2);
    dict.extend([(3, Rc::clone(&a)), (3, Rc::clone(&b))]);
    assert_eq!(a.bindings().parent(), None);
    assert!(b.bindings().parent().is_some());
    assert_eq!(dict.len(), 1);
}

#[test]
fn nested_containers_bubble_to_root() {
    let d = Dispatcher::new();
    let outer: BindableList<Rc<BindableList<i32>>> = BindableList::linked_in(&d);
    let inner = Rc::new(BindableList::in_dispatcher(&d));
    outer.push(Rc::clone(&inner));

    let events = record(&outer);
    inner.push(1);
    inner.clear();
    assert_eq!(
        *events.borrow(),
        vec![(ChangeKind::Add, true), (ChangeKind::Clear, true)]
    );
}

#[test]
fn dropping_list_detaches_elements() {
    let d = Dispatcher::new();
    let item = Item::new(&d, 1);
    {
        let list: BindableList<Rc<Item>> = BindableList::linked_in(&d);
        list.push(Rc::clone(&item));
    }
    assert_eq!(item.bindings().parent(), None);
}

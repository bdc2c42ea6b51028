//! Diagnostics emitted by member lookup and pool exhaustion.

use std::sync::{Arc, Mutex};

use bindkit_core::{
    BindConfig, BindError, Bindable, Bindings, Dispatcher, MemberKey, MemberLookup, bindable_members,
};
use tracing_subscriber::layer::SubscriberExt as _;

bindable_members! {
    enum Hero {
        Health => "health",
        Level => "level",
    }
}

struct HeroModel {
    bindings: Bindings,
}

impl Bindable for HeroModel {
    fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

/// Captures `[LEVEL] message` lines.
struct LogCapture {
    logs: Arc<Mutex<Vec<String>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for LogCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        struct MessageVisitor {
            message: String,
        }

        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = format!("{value:?}");
                }
            }
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        self.logs
            .lock()
            .unwrap()
            .push(format!("[{}] {}", event.metadata().level(), visitor.message));
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    let logs = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(LogCapture {
        logs: Arc::clone(&logs),
    });
    let out = tracing::subscriber::with_default(subscriber, f);
    let captured = logs.lock().unwrap().clone();
    (out, captured)
}

#[test]
fn lenient_lookup_warns_and_falls_back() {
    let hero = HeroModel {
        bindings: Bindings::for_members_in::<Hero>(&Dispatcher::new()),
    };
    let (handle, logs) = capture(|| hero.get_handle(MemberKey::from("mana")).unwrap());
    assert_eq!(handle, hero.bindings().all_members());
    assert!(
        logs.iter()
            .any(|l| l.starts_with("[WARN]") && l.contains("unknown member")),
        "expected fallback warning, got {logs:?}"
    );
}

#[test]
fn declared_members_do_not_warn() {
    let hero = HeroModel {
        bindings: Bindings::for_members_in::<Hero>(&Dispatcher::new()),
    };
    let (handle, logs) = capture(|| hero.get_handle(Hero::Level.into()).unwrap());
    assert_eq!(handle.member(), Some(MemberKey::from("level")));
    assert!(!logs.iter().any(|l| l.starts_with("[WARN]")), "{logs:?}");
}

#[test]
fn strict_lookup_rejects() {
    let d = Dispatcher::with_config(BindConfig::new().with_member_lookup(MemberLookup::Strict));
    let hero = HeroModel {
        bindings: Bindings::for_members_in::<Hero>(&d),
    };
    let (result, _) = capture(|| hero.get_handle(MemberKey::from("mana")));
    assert_eq!(
        result.unwrap_err(),
        BindError::UnknownMember {
            member: "mana".into()
        }
    );
}

#[test]
fn pool_exhaustion_logs_error() {
    let d = Dispatcher::with_config(BindConfig::new().with_pool_capacity(1));
    let b = Bindings::in_dispatcher(&d);
    let h = b.all_members();
    let inner = h.clone();
    h.subscribe(move |_| {
        let _ = inner.try_publish_change(bindkit_core::Change::republish(None));
    });
    let ((), logs) = capture(|| h.publish(0, 1));
    assert!(
        logs.iter()
            .any(|l| l.starts_with("[ERROR]") && l.contains("payload pool exhausted")),
        "{logs:?}"
    );
    assert!(d.pool_stats().is_balanced());
}

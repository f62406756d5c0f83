use obase_types::{AttrId, Object, Value};

/// Verdict of a pre-hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookOutcome {
    Allow,
    Reject { reason: String },
}

/// A pending or completed attribute assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignEvent {
    pub object: Object,
    pub attribute: AttrId,
    pub name: String,
    pub previous: Value,
    pub value: Value,
}

/// The direct attribute values of one class segment, taken before the
/// segment is removed.
#[derive(Clone, Debug, PartialEq)]
pub struct LeaveSnapshot {
    /// The record viewed through the class being left.
    pub object: Object,
    pub class_name: String,
    pub values: Vec<(String, Value)>,
}

/// Callbacks around the object lifecycle.
///
/// Pre-hooks run inside the operation, before anything is written; a
/// rejection aborts the operation with nothing applied. Post-hooks run after
/// the operation has been committed. Leave cannot be vetoed.
pub trait LifecycleHook: Send + Sync {
    fn pre_create(&self, _object: &Object, _values: &[(String, Value)]) -> HookOutcome {
        HookOutcome::Allow
    }

    fn post_create(&self, _object: &Object) {}

    fn pre_enter(&self, _object: &Object, _values: &[(String, Value)]) -> HookOutcome {
        HookOutcome::Allow
    }

    fn post_enter(&self, _object: &Object) {}

    fn pre_leave(&self, _snapshot: &LeaveSnapshot) {}

    fn post_leave(&self, _snapshot: &LeaveSnapshot) {}

    fn pre_assign(&self, _event: &AssignEvent) -> HookOutcome {
        HookOutcome::Allow
    }

    fn post_assign(&self, _event: &AssignEvent) {}
}

pub struct NoOpHook;

impl LifecycleHook for NoOpHook {}

/// A post-hook call deferred until commit.
#[derive(Clone, Debug)]
pub(crate) enum PostEvent {
    Created(Object),
    Entered(Object),
    Left(LeaveSnapshot),
    Assigned(AssignEvent),
}

impl PostEvent {
    pub(crate) fn dispatch(&self, hook: &dyn LifecycleHook) {
        match self {
            PostEvent::Created(object) => hook.post_create(object),
            PostEvent::Entered(object) => hook.post_enter(object),
            PostEvent::Left(snapshot) => hook.post_leave(snapshot),
            PostEvent::Assigned(event) => hook.post_assign(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obase_types::{ClassId, Rank};

    fn object() -> Object {
        let class = ClassId::new(Rank::new(1));
        Object::new(class, class, Rank::new(2))
    }

    #[test]
    fn noop_hook_allows() {
        let hook = NoOpHook;
        assert_eq!(hook.pre_create(&object(), &[]), HookOutcome::Allow);
        assert_eq!(hook.pre_enter(&object(), &[]), HookOutcome::Allow);
        let event = AssignEvent {
            object: object(),
            attribute: AttrId::new(Rank::new(3)),
            name: "name".into(),
            previous: Value::Null,
            value: Value::from("x"),
        };
        assert_eq!(hook.pre_assign(&event), HookOutcome::Allow);
    }

    #[test]
    fn dispatch_reaches_post_hooks() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct Recorder(Mutex<Vec<&'static str>>);

        impl LifecycleHook for Recorder {
            fn post_create(&self, _object: &Object) {
                self.0.lock().unwrap().push("create");
            }
            fn post_leave(&self, _snapshot: &LeaveSnapshot) {
                self.0.lock().unwrap().push("leave");
            }
        }

        let hook = Recorder::default();
        PostEvent::Created(object()).dispatch(&hook);
        PostEvent::Left(LeaveSnapshot {
            object: object(),
            class_name: "Person".into(),
            values: vec![],
        })
        .dispatch(&hook);
        PostEvent::Entered(object()).dispatch(&hook);
        assert_eq!(*hook.0.lock().unwrap(), vec!["create", "leave"]);
    }
}

use std::rc::Rc;

use leptos::*;

use crate::{
    binding::{downcast_value, Binding},
    AnyValue, EngineEvent, EventKind, EventListener, QueryValue, Unsubscribe,
};

/// Engine and environment listeners attached for a single key.
pub(crate) struct SubscriptionSet {
    key: String,
    handles: Vec<Unsubscribe>,
}

impl SubscriptionSet {
    pub(crate) fn install<V>(binding: &Rc<Binding<V>>, key: &str) -> Self
    where
        V: QueryValue,
    {
        let engine = binding.engine();
        let mut handles = Vec::with_capacity(EventKind::ALL.len() + 2);

        for kind in EventKind::ALL {
            handles.push(engine.subscribe(key, kind, event_listener(binding, key)));
        }

        let environment = &binding.options.environment;

        if binding.options.refetch_on_focus {
            let binding = Rc::downgrade(binding);
            handles.push(environment.on_focus(Rc::new(move || {
                if let Some(binding) = binding.upgrade() {
                    binding.handle_focus();
                }
            })));
        }

        if binding.options.refetch_on_connect {
            let binding = Rc::downgrade(binding);
            handles.push(environment.on_online(Rc::new(move || {
                if let Some(binding) = binding.upgrade() {
                    binding.spawn_refetch();
                }
            })));
        }

        SubscriptionSet {
            key: key.to_string(),
            handles,
        }
    }

    pub(crate) fn teardown(self) {
        for unsubscribe in self.handles {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("key", &self.key)
            .field("handles", &self.handles.len())
            .finish()
    }
}

// Translates engine events for `key` into the binding's signals.
fn event_listener<V>(binding: &Binding<V>, key: &str) -> EventListener
where
    V: QueryValue,
{
    let key = key.to_string();
    let resource = binding.resource;
    let error = binding.error;
    let is_refetching = binding.is_refetching;
    let clear_on_forget = binding.options.clear_on_forget;

    let set_resource = move |key: &str, value: &AnyValue| match downcast_value::<V>(key, value) {
        Ok(value) => resource.set(Some(value)),
        Err(mismatch) => logging::debug_warn!("Ignoring engine value: {mismatch}"),
    };

    Rc::new(move |event: &EngineEvent| match event {
        EngineEvent::Mutated(value) => set_resource(&key, value),
        EngineEvent::Refetching => is_refetching.set(true),
        EngineEvent::Resolved(value) => {
            is_refetching.set(false);
            set_resource(&key, value);
        }
        EngineEvent::Error(e) => {
            is_refetching.set(false);
            error.set(Some(e.clone()));
        }
        EngineEvent::Forgotten => {
            if clear_on_forget {
                resource.set(None);
            }
        }
    })
}

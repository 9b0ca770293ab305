use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Single-threaded callback registry.
pub struct Listeners<T> {
    registry: Rc<RefCell<Registry<T>>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, Rc::new(listener)));
            id
        };
        let weak: Weak<RefCell<Registry<T>>> = Rc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.borrow_mut().entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Calls every listener. Listeners may subscribe or unsubscribe while
    /// being notified; changes take effect on the next emit.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .registry
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

/// Handle returned by `subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn emits_to_live_subscribers_only() {
        let listeners = Listeners::<u32>::new();
        let seen = Rc::new(Cell::new(0));

        let seen_a = seen.clone();
        let first = listeners.subscribe(move |v| seen_a.set(seen_a.get() + v));
        let seen_b = seen.clone();
        let second = listeners.subscribe(move |v| seen_b.set(seen_b.get() + v * 10));

        listeners.emit(&1);
        assert_eq!(seen.get(), 11);

        second.unsubscribe();
        listeners.emit(&1);
        assert_eq!(seen.get(), 12);

        drop(first);
        listeners.emit(&1);
        assert_eq!(seen.get(), 12);
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let listeners = Listeners::<()>::new();
        let sub = listeners.subscribe(|_| {});
        drop(listeners);
        drop(sub);
    }
}

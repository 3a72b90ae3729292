use std::{
    env, ffi::OsString, sync::{Mutex, MutexGuard}
};

use tracing::trace;

use crate::settings::AssetVar;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Temporarily overrides one variable, restoring what was there on drop.
///
/// Nested scopes on the same variable must drop in reverse creation order.
#[must_use = "the override is reverted as soon as the scope drops"]
#[derive(Debug)]
pub struct ScopedEnv {
    key: &'static str,
    previous: Option<OsString>,
}

impl ScopedEnv {
    pub fn set(var: AssetVar, value: &str) -> Self {
        Self::apply(var.key(), Some(value))
    }

    pub fn remove(var: AssetVar) -> Self {
        Self::apply(var.key(), None)
    }

    fn apply(key: &'static str, value: Option<&str>) -> Self {
        let _lock = env_lock();
        let previous = env::var_os(key);
        trace!(key, ?value, "overriding environment variable");
        write(key, value.map(OsString::from));
        Self { key, previous }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        let _lock = env_lock();
        write(self.key, self.previous.take());
    }
}

// Callers hold `ENV_LOCK`, so no other thread in this process mutates the
// environment concurrently.
fn write(key: &str, value: Option<OsString>) {
    match value {
        Some(value) => unsafe { env::set_var(key, value) },
        None => unsafe { env::remove_var(key) },
    }
}

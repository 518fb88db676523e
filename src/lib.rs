// Cachet - a backend-agnostic cache abstraction for Rust
//
// One async capability contract for key-value caches, a registry that opens
// backends by driver name, and namespaces that keep users of a shared backend
// apart.

// Re-export core functionality
pub use cachet_core::*;

// Re-export optional backends
#[cfg(feature = "memory")]
pub use cachet_memory;

#[cfg(feature = "memory")]
pub use cachet_memory::MemoryCache;

/// Register every backend compiled into this build in the global registry.
///
/// Returns the names of the drivers that were newly registered.
pub fn register_builtin_drivers() -> Vec<&'static str> {
    #[allow(unused_mut)]
    let mut registered = Vec::new();

    #[cfg(feature = "memory")]
    if cachet_memory::register_global() {
        registered.push(cachet_memory::DRIVER_NAME);
    }

    registered
}

//! The exported construction function.

use std::ptr;

use vstbridge_core::{HostCallbackProc, PluginDescriptor};

use crate::plugin::Plugin;
use crate::wrapper::Wrapper;

/// Construct a `P` for a host and return its descriptor, or null.
///
/// Null is returned when `callback` is missing, the host does not answer the
/// version query, or `P::new` fails. Use [`export_vst2!`](crate::export_vst2)
/// to expose this under the symbol names hosts look for.
///
/// # Safety
/// `callback` must stay callable until the returned instance is closed.
pub unsafe extern "C" fn entry_point<P: Plugin>(
    callback: Option<HostCallbackProc>,
) -> *mut PluginDescriptor {
    let Some(callback) = callback else {
        tracing::warn!("entry point called without a host callback");
        return ptr::null_mut();
    };
    match Wrapper::<P>::construct(callback) {
        Ok(effect) => effect,
        Err(e) => {
            tracing::error!(error = %e, "plugin construction failed");
            ptr::null_mut()
        }
    }
}

/// Export a [`Plugin`] from a `cdylib` under the standard entry symbols.
///
/// ```ignore
/// vstbridge_plugin::export_vst2!(Gain);
/// ```
#[macro_export]
macro_rules! export_vst2 {
    ($plugin:ty) => {
        #[no_mangle]
        pub unsafe extern "C" fn VSTPluginMain(
            callback: ::std::option::Option<$crate::__private::HostCallbackProc>,
        ) -> *mut $crate::__private::PluginDescriptor {
            $crate::entry_point::<$plugin>(callback)
        }

        #[cfg(target_os = "macos")]
        #[no_mangle]
        pub unsafe extern "C" fn main_macho(
            callback: ::std::option::Option<$crate::__private::HostCallbackProc>,
        ) -> *mut $crate::__private::PluginDescriptor {
            $crate::entry_point::<$plugin>(callback)
        }
    };
}

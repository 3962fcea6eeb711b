//! Native callback plumbing
//!
//! C libraries keep the function pointers and user-data pointers they are
//! given and call back into them from their own dispatch routines. The types
//! here make the lifetime of that user data a property of ownership:
//!
//! - callbacks are plain `extern "C" fn` items, never closures
//! - per-object context lives in a [`CallbackToken`], a heap allocation whose
//!   address never changes while the token is alive
//! - a [`NativeBinding`] owns the native object together with its token, and
//!   its `Drop` destroys the native object before the token is released

pub mod libdecor;

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

/// Heap-stable context handed to a C library as `void *user_data`
pub struct CallbackToken<T> {
    ptr: NonNull<T>,
}

impl<T> CallbackToken<T> {
    pub fn new(value: T) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        Self { ptr }
    }

    /// The opaque pointer to register with the native library
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    /// Recover the context inside a callback
    ///
    /// # Safety
    ///
    /// `data` must come from [`CallbackToken::as_ptr`] on a token of the same
    /// `T` that is still alive, and the returned reference must not outlive
    /// the callback invocation.
    pub unsafe fn recover<'a>(data: *mut c_void) -> Option<&'a T> {
        // SAFETY: guaranteed by the caller
        unsafe { data.cast::<T>().as_ref() }
    }

    pub fn get(&self) -> &T {
        // SAFETY: the allocation is owned by `self` and only shared
        // references are ever produced from it.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Drop for CallbackToken<T> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `Box::leak` and is released exactly once
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

impl<T: fmt::Debug> fmt::Debug for CallbackToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallbackToken").field(self.get()).finish()
    }
}

/// A native object that holds a pointer to a [`CallbackToken`]
pub struct NativeBinding<T> {
    native: NonNull<c_void>,
    destroy: Box<dyn FnMut(NonNull<c_void>)>,
    // Declared last: fields drop after `Drop::drop` has destroyed `native`.
    token: CallbackToken<T>,
}

impl<T> NativeBinding<T> {
    /// Create the native object with `create`, passing it the token pointer
    ///
    /// Returns `None` when `create` returns null; the token is then freed
    /// since nothing can reference it.
    pub fn new(
        context: T,
        create: impl FnOnce(*mut c_void) -> *mut c_void,
        destroy: impl FnMut(NonNull<c_void>) + 'static,
    ) -> Option<Self> {
        let token = CallbackToken::new(context);
        let native = NonNull::new(create(token.as_ptr()))?;
        Some(Self {
            native,
            destroy: Box::new(destroy),
            token,
        })
    }

    pub fn native(&self) -> *mut c_void {
        self.native.as_ptr()
    }

    pub fn context(&self) -> &T {
        self.token.get()
    }
}

impl<T> Drop for NativeBinding<T> {
    fn drop(&mut self) {
        (self.destroy)(self.native);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    /// A C-style registry that stores callbacks and user data like libwayland
    #[derive(Default)]
    struct FakeLibrary {
        objects: RefCell<Vec<Option<(extern "C" fn(*mut c_void, u32), *mut c_void)>>>,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl FakeLibrary {
        fn create(&self, callback: extern "C" fn(*mut c_void, u32), data: *mut c_void) -> *mut c_void {
            let mut objects = self.objects.borrow_mut();
            objects.push(Some((callback, data)));
            // Handles are 1-based indices so they are never null
            objects.len() as *mut c_void
        }

        fn emit(&self, handle: *mut c_void, value: u32) {
            let entry = self.objects.borrow()[handle as usize - 1];
            if let Some((callback, data)) = entry {
                callback(data, value);
            }
        }

        fn destroy(&self, handle: NonNull<c_void>) {
            self.log.borrow_mut().push("destroy");
            self.objects.borrow_mut()[handle.as_ptr() as usize - 1] = None;
        }
    }

    struct Counter {
        total: Cell<u32>,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Drop for Counter {
        fn drop(&mut self) {
            self.log.borrow_mut().push("free token");
        }
    }

    extern "C" fn handle_value(data: *mut c_void, value: u32) {
        // SAFETY: registered with a live `CallbackToken<Counter>`
        if let Some(counter) = unsafe { CallbackToken::<Counter>::recover(data) } {
            counter.total.set(counter.total.get() + value);
        }
    }

    #[test]
    fn test_token_recover() {
        let token = CallbackToken::new(Cell::new(5u32));
        // SAFETY: token is alive for the whole test
        let recovered = unsafe { CallbackToken::<Cell<u32>>::recover(token.as_ptr()) }.unwrap();
        recovered.set(6);
        assert_eq!(token.get().get(), 6);
        assert!(unsafe { CallbackToken::<u32>::recover(std::ptr::null_mut()) }.is_none());
    }

    #[test]
    fn test_token_address_is_stable() {
        let token = CallbackToken::new([0u8; 64]);
        let before = token.as_ptr();
        let moved = token;
        assert_eq!(before, moved.as_ptr());
    }

    #[test]
    fn test_binding_dispatch_reaches_context() {
        let library = Rc::new(FakeLibrary::default());
        let log = library.log.clone();
        let destroy_lib = library.clone();

        let binding = NativeBinding::new(
            Counter { total: Cell::new(0), log },
            |data| library.create(handle_value, data),
            move |native| destroy_lib.destroy(native),
        )
        .unwrap();

        library.emit(binding.native(), 3);
        library.emit(binding.native(), 4);
        assert_eq!(binding.context().total.get(), 7);
    }

    #[test]
    fn test_binding_destroys_native_before_token() {
        let library = Rc::new(FakeLibrary::default());
        let log = library.log.clone();
        let destroy_lib = library.clone();

        let binding = NativeBinding::new(
            Counter { total: Cell::new(0), log: log.clone() },
            |data| library.create(handle_value, data),
            move |native| destroy_lib.destroy(native),
        )
        .unwrap();
        let handle = binding.native();
        drop(binding);

        assert_eq!(*log.borrow(), vec!["destroy", "free token"]);
        // The library no longer holds the pointer, so emitting is a no-op
        library.emit(handle, 1);
    }

    #[test]
    fn test_failed_create_frees_token() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let binding = NativeBinding::new(
            Counter { total: Cell::new(0), log: log.clone() },
            |_| std::ptr::null_mut(),
            |_| panic!("nothing to destroy"),
        );
        assert!(binding.is_none());
        assert_eq!(*log.borrow(), vec!["free token"]);
    }
}

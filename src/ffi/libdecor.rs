//! Client-side decorations through libdecor
//!
//! libdecor is loaded at runtime so the crate neither links against it nor
//! requires it on compositors that draw decorations themselves. The library
//! calls back into the `extern "C" fn` items below; per-frame state reaches
//! them through a [`CallbackToken`] owned by the frame's [`NativeBinding`].

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr::{self, NonNull};
use std::rc::Rc;

use libloading::Library;
use log::{debug, error, trace};

use super::{CallbackToken, NativeBinding};
use crate::error::{PlatformError, Result};

const LIBDECOR_SONAME: &str = "libdecor-0.so.0";

/// `LIBDECOR_WINDOW_STATE_ACTIVE`
const WINDOW_STATE_ACTIVE: u32 = 1;

type Reserved = Option<unsafe extern "C" fn()>;

#[repr(C)]
struct LibdecorInterface {
    error: unsafe extern "C" fn(context: *mut c_void, error: c_int, message: *const c_char),
    reserved: [Reserved; 10],
}

#[repr(C)]
struct LibdecorFrameInterface {
    configure:
        unsafe extern "C" fn(frame: *mut c_void, configuration: *mut c_void, user_data: *mut c_void),
    close: unsafe extern "C" fn(frame: *mut c_void, user_data: *mut c_void),
    commit: unsafe extern "C" fn(frame: *mut c_void, user_data: *mut c_void),
    dismiss_popup:
        unsafe extern "C" fn(frame: *mut c_void, seat_name: *const c_char, user_data: *mut c_void),
    /// `bounds` (libdecor 0.2) followed by padding
    reserved: [Reserved; 10],
}

static CONTEXT_INTERFACE: LibdecorInterface = LibdecorInterface {
    error: handle_error,
    reserved: [None; 10],
};

static FRAME_INTERFACE: LibdecorFrameInterface = LibdecorFrameInterface {
    configure: handle_frame_configure,
    close: handle_frame_close,
    commit: handle_frame_commit,
    dismiss_popup: handle_frame_dismiss_popup,
    reserved: [None; 10],
};

/// Function table resolved from the shared object
struct LibdecorFns {
    new: unsafe extern "C" fn(display: *mut c_void, iface: *const LibdecorInterface) -> *mut c_void,
    unref: unsafe extern "C" fn(context: *mut c_void),
    dispatch: unsafe extern "C" fn(context: *mut c_void, timeout: c_int) -> c_int,
    decorate: unsafe extern "C" fn(
        context: *mut c_void,
        surface: *mut c_void,
        iface: *const LibdecorFrameInterface,
        user_data: *mut c_void,
    ) -> *mut c_void,
    frame_unref: unsafe extern "C" fn(frame: *mut c_void),
    frame_set_visibility: unsafe extern "C" fn(frame: *mut c_void, visible: bool),
    frame_set_title: unsafe extern "C" fn(frame: *mut c_void, title: *const c_char),
    frame_set_app_id: unsafe extern "C" fn(frame: *mut c_void, app_id: *const c_char),
    frame_set_min_content_size: unsafe extern "C" fn(frame: *mut c_void, width: c_int, height: c_int),
    frame_set_max_content_size: unsafe extern "C" fn(frame: *mut c_void, width: c_int, height: c_int),
    frame_commit: unsafe extern "C" fn(frame: *mut c_void, state: *mut c_void, configuration: *mut c_void),
    frame_map: unsafe extern "C" fn(frame: *mut c_void),
    state_new: unsafe extern "C" fn(width: c_int, height: c_int) -> *mut c_void,
    state_free: unsafe extern "C" fn(state: *mut c_void),
    configuration_get_content_size: unsafe extern "C" fn(
        configuration: *mut c_void,
        frame: *mut c_void,
        width: *mut c_int,
        height: *mut c_int,
    ) -> bool,
    configuration_get_window_state:
        unsafe extern "C" fn(configuration: *mut c_void, state: *mut u32) -> bool,
    /// Keeps the function pointers above valid
    _library: Library,
}

impl LibdecorFns {
    fn load() -> std::result::Result<Self, libloading::Error> {
        // SAFETY: loading libdecor runs no initialisers with preconditions,
        // and every symbol below is declared with its C prototype.
        unsafe {
            let library = Library::new(LIBDECOR_SONAME)?;
            Ok(Self {
                new: *library.get(b"libdecor_new\0")?,
                unref: *library.get(b"libdecor_unref\0")?,
                dispatch: *library.get(b"libdecor_dispatch\0")?,
                decorate: *library.get(b"libdecor_decorate\0")?,
                frame_unref: *library.get(b"libdecor_frame_unref\0")?,
                frame_set_visibility: *library.get(b"libdecor_frame_set_visibility\0")?,
                frame_set_title: *library.get(b"libdecor_frame_set_title\0")?,
                frame_set_app_id: *library.get(b"libdecor_frame_set_app_id\0")?,
                frame_set_min_content_size: *library.get(b"libdecor_frame_set_min_content_size\0")?,
                frame_set_max_content_size: *library.get(b"libdecor_frame_set_max_content_size\0")?,
                frame_commit: *library.get(b"libdecor_frame_commit\0")?,
                frame_map: *library.get(b"libdecor_frame_map\0")?,
                state_new: *library.get(b"libdecor_state_new\0")?,
                state_free: *library.get(b"libdecor_state_free\0")?,
                configuration_get_content_size: *library
                    .get(b"libdecor_configuration_get_content_size\0")?,
                configuration_get_window_state: *library
                    .get(b"libdecor_configuration_get_window_state\0")?,
                _library: library,
            })
        }
    }
}

/// A libdecor context bound to one `wl_display`
struct ContextInner {
    fns: LibdecorFns,
    context: NonNull<c_void>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        // SAFETY: every frame holds an `Rc` to this context, so none is left
        unsafe { (self.fns.unref)(self.context.as_ptr()) };
    }
}

/// Handle to a loaded libdecor context
#[derive(Clone)]
pub struct Libdecor {
    inner: Rc<ContextInner>,
}

impl Libdecor {
    /// Load libdecor and create a context for `display` (`struct wl_display *`)
    pub fn new(display: *mut c_void) -> Result<Self> {
        let fns = LibdecorFns::load()
            .map_err(|e| PlatformError::ProtocolMissing(format!("libdecor ({e})")))?;
        // SAFETY: `display` is the live display of this connection and the
        // interface table is a static.
        let context = unsafe { (fns.new)(display, &CONTEXT_INTERFACE) };
        let context = NonNull::new(context).ok_or_else(|| {
            PlatformError::PlatformInitializationFailed("libdecor_new failed".into())
        })?;
        debug!("Loaded {}", LIBDECOR_SONAME);
        Ok(Self {
            inner: Rc::new(ContextInner { fns, context }),
        })
    }

    /// Run pending libdecor work without blocking
    pub fn dispatch(&self) -> Result<()> {
        // SAFETY: context is alive for `self`
        let ret = unsafe { (self.inner.fns.dispatch)(self.inner.context.as_ptr(), 0) };
        if ret < 0 {
            return Err(PlatformError::ConnectionLost("libdecor_dispatch failed".into()));
        }
        Ok(())
    }

    /// Wrap `surface` (`struct wl_surface *`) in a decorated frame
    pub fn decorate(
        &self,
        surface: *mut c_void,
        title: &str,
        app_id: &str,
        size: (u32, u32),
    ) -> Result<DecoratedFrame> {
        let inner = self.inner.clone();
        let context = FrameContext {
            lib: self.inner.clone(),
            size: Cell::new((size.0 as i32, size.1 as i32)),
            notices: RefCell::new(Vec::new()),
        };
        let binding = NativeBinding::new(
            context,
            |data| {
                // SAFETY: surface and context are live; `data` is the token
                // owned by the binding created here.
                unsafe {
                    (self.inner.fns.decorate)(
                        self.inner.context.as_ptr(),
                        surface,
                        &FRAME_INTERFACE,
                        data,
                    )
                }
            },
            // SAFETY: the frame pointer is released exactly once
            move |frame| unsafe { (inner.fns.frame_unref)(frame.as_ptr()) },
        )
        .ok_or_else(|| PlatformError::PlatformInitializationFailed("libdecor_decorate failed".into()))?;

        let frame = DecoratedFrame { binding };
        frame.set_title(title);
        frame.set_app_id(app_id);
        Ok(frame)
    }
}

/// What a frame callback reported, drained after `Libdecor::dispatch`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameNotice {
    /// The frame was configured and committed at this content size
    Configure { size: (u32, u32), active: bool },
    Close,
    /// libdecor wants the application to commit the surface
    Commit,
}

/// Per-frame context reachable from the frame callbacks
pub struct FrameContext {
    lib: Rc<ContextInner>,
    size: Cell<(i32, i32)>,
    notices: RefCell<Vec<FrameNotice>>,
}

impl FrameContext {
    fn push(&self, notice: FrameNotice) {
        self.notices.borrow_mut().push(notice);
    }
}

/// A surface decorated by libdecor
pub struct DecoratedFrame {
    binding: NativeBinding<FrameContext>,
}

impl DecoratedFrame {
    fn fns(&self) -> &LibdecorFns {
        &self.binding.context().lib.fns
    }

    pub fn set_title(&self, title: &str) {
        let Ok(title) = CString::new(title) else { return };
        // SAFETY: frame alive, string outlives the call
        unsafe { (self.fns().frame_set_title)(self.binding.native(), title.as_ptr()) };
    }

    pub fn set_app_id(&self, app_id: &str) {
        let Ok(app_id) = CString::new(app_id) else { return };
        // SAFETY: frame alive, string outlives the call
        unsafe { (self.fns().frame_set_app_id)(self.binding.native(), app_id.as_ptr()) };
    }

    /// Toggle whether libdecor draws decorations for this frame
    pub fn set_visibility(&self, visible: bool) {
        // SAFETY: frame alive
        unsafe { (self.fns().frame_set_visibility)(self.binding.native(), visible) };
    }

    /// `None` clears the constraint
    pub fn set_min_size(&self, size: Option<(u32, u32)>) {
        let (w, h) = size.map_or((0, 0), |(w, h)| (w as c_int, h as c_int));
        // SAFETY: frame alive
        unsafe { (self.fns().frame_set_min_content_size)(self.binding.native(), w, h) };
    }

    /// `None` clears the constraint
    pub fn set_max_size(&self, size: Option<(u32, u32)>) {
        let (w, h) = size.map_or((0, 0), |(w, h)| (w as c_int, h as c_int));
        // SAFETY: frame alive
        unsafe { (self.fns().frame_set_max_content_size)(self.binding.native(), w, h) };
    }

    /// Map the frame; the first configure follows
    pub fn map(&self) {
        // SAFETY: frame alive
        unsafe { (self.fns().frame_map)(self.binding.native()) };
    }

    /// Commit a new content size outside a configure sequence
    pub fn commit_size(&self, size: (u32, u32)) {
        let (w, h) = (size.0 as c_int, size.1 as c_int);
        self.binding.context().size.set((w, h));
        let fns = self.fns();
        // SAFETY: frame alive; the state is freed after the commit copied it
        unsafe {
            let state = (fns.state_new)(w, h);
            (fns.frame_commit)(self.binding.native(), state, ptr::null_mut());
            (fns.state_free)(state);
        }
    }

    pub fn take_notices(&self) -> Vec<FrameNotice> {
        std::mem::take(&mut *self.binding.context().notices.borrow_mut())
    }
}

unsafe extern "C" fn handle_error(_context: *mut c_void, code: c_int, message: *const c_char) {
    let message = if message.is_null() {
        "unknown".into()
    } else {
        // SAFETY: libdecor passes a NUL-terminated string
        unsafe { CStr::from_ptr(message) }.to_string_lossy()
    };
    error!("libdecor error {}: {}", code, message);
}

unsafe extern "C" fn handle_frame_configure(
    frame: *mut c_void,
    configuration: *mut c_void,
    user_data: *mut c_void,
) {
    // SAFETY: user_data is the token of the frame's binding, alive until
    // `libdecor_frame_unref` returns
    let Some(context) = (unsafe { CallbackToken::<FrameContext>::recover(user_data) }) else {
        return;
    };
    let fns = &context.lib.fns;

    let (mut width, mut height): (c_int, c_int) = (0, 0);
    // SAFETY: configuration and frame are valid for this callback
    let has_size = unsafe {
        (fns.configuration_get_content_size)(configuration, frame, &mut width, &mut height)
    };
    if !has_size || width <= 0 || height <= 0 {
        (width, height) = context.size.get();
    }
    context.size.set((width, height));

    let mut window_state = 0u32;
    // SAFETY: as above
    let active = unsafe { (fns.configuration_get_window_state)(configuration, &mut window_state) }
        && window_state & WINDOW_STATE_ACTIVE != 0;

    // SAFETY: the state is freed after the commit copied it
    unsafe {
        let state = (fns.state_new)(width, height);
        (fns.frame_commit)(frame, state, configuration);
        (fns.state_free)(state);
    }

    trace!("libdecor configure {}x{} active={}", width, height, active);
    context.push(FrameNotice::Configure {
        size: (width as u32, height as u32),
        active,
    });
}

unsafe extern "C" fn handle_frame_close(_frame: *mut c_void, user_data: *mut c_void) {
    // SAFETY: see `handle_frame_configure`
    if let Some(context) = unsafe { CallbackToken::<FrameContext>::recover(user_data) } {
        context.push(FrameNotice::Close);
    }
}

unsafe extern "C" fn handle_frame_commit(_frame: *mut c_void, user_data: *mut c_void) {
    // SAFETY: see `handle_frame_configure`
    if let Some(context) = unsafe { CallbackToken::<FrameContext>::recover(user_data) } {
        context.push(FrameNotice::Commit);
    }
}

unsafe extern "C" fn handle_frame_dismiss_popup(
    _frame: *mut c_void,
    _seat_name: *const c_char,
    _user_data: *mut c_void,
) {
}

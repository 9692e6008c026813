//! macOS implementation: AppKit for the frontmost application and icons, the
//! AX observer API for per-process activation notifications, and the Text
//! Input Source (TIS) API for enumerating and selecting keyboard input
//! sources.

use crate::tracker::ProcessTable;
use crate::{ObserverBackend, WatcherError, WatcherEvent};
use block::ConcreteBlock;
use cocoa::base::{id, nil};
use cocoa::foundation::NSString;
use core_foundation::array::{CFArrayGetCount, CFArrayGetValueAtIndex, CFArrayRef};
use core_foundation::base::{CFRelease, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopSource, CFRunLoopSourceRef};
use core_foundation::string::{CFString, CFStringRef};
use core_foundation::url::{CFURLRef, CFURL};
use keyshift_core::{FrontmostApp, IconBytes, InputSourceRef, Pid, SourceError};
use objc::{class, msg_send, sel, sel_impl};
use std::cell::RefCell;
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;
use std::sync::mpsc::Sender;
use tracing::{debug, info};

type AXObserverRef = *mut c_void;
type AXUIElementRef = *mut c_void;
type AXError = i32;
type OSStatus = i32;
type TISInputSourceRef = *mut c_void;

type AXObserverCallback =
    extern "C" fn(AXObserverRef, AXUIElementRef, CFStringRef, *mut c_void);

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    static kAXTrustedCheckOptionPrompt: CFStringRef;

    fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;
    fn AXObserverCreate(
        application: Pid,
        callback: AXObserverCallback,
        out_observer: *mut AXObserverRef,
    ) -> AXError;
    fn AXObserverGetRunLoopSource(observer: AXObserverRef) -> CFRunLoopSourceRef;
    fn AXObserverAddNotification(
        observer: AXObserverRef,
        element: AXUIElementRef,
        notification: CFStringRef,
        refcon: *mut c_void,
    ) -> AXError;
    fn AXUIElementCreateApplication(pid: Pid) -> AXUIElementRef;
}

#[link(name = "Carbon", kind = "framework")]
extern "C" {
    static kTISPropertyInputSourceID: CFStringRef;
    static kTISPropertyInputSourceCategory: CFStringRef;
    static kTISPropertyInputSourceIsSelectCapable: CFStringRef;
    static kTISPropertyIconImageURL: CFStringRef;
    static kTISCategoryKeyboardInputSource: CFStringRef;

    fn TISCreateInputSourceList(
        properties: CFDictionaryRef,
        include_all_installed: u8,
    ) -> CFArrayRef;
    fn TISCopyCurrentKeyboardInputSource() -> TISInputSourceRef;
    fn TISSelectInputSource(source: TISInputSourceRef) -> OSStatus;
    fn TISGetInputSourceProperty(source: TISInputSourceRef, key: CFStringRef) -> *mut c_void;
}

const AX_ERROR_SUCCESS: AXError = 0;
const NS_BITMAP_IMAGE_FILE_TYPE_PNG: u64 = 4;

// --- Accessibility permission ---------------------------------------------

pub fn has_accessibility_permission(prompt: bool) -> bool {
    unsafe {
        let key = CFString::wrap_under_get_rule(kAXTrustedCheckOptionPrompt);
        let options = CFDictionary::from_CFType_pairs(&[(
            key.as_CFType(),
            CFBoolean::from(prompt).as_CFType(),
        )]);
        AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef())
    }
}

// --- Frontmost application ------------------------------------------------

pub fn frontmost_app() -> Option<FrontmostApp> {
    unsafe {
        let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
        if workspace == nil {
            return None;
        }
        let app: id = msg_send![workspace, frontmostApplication];
        if app == nil {
            return None;
        }
        Some(running_app_info(app))
    }
}

unsafe fn running_app_info(app: id) -> FrontmostApp {
    let pid: Pid = msg_send![app, processIdentifier];

    let bundle: id = msg_send![app, bundleIdentifier];
    let bundle_id = (bundle != nil).then(|| nsstring_to_string(bundle));

    let name: id = msg_send![app, localizedName];
    let name = if name != nil {
        nsstring_to_string(name)
    } else {
        String::new()
    };

    let icon: id = msg_send![app, icon];
    let icon = if icon != nil {
        nsimage_to_png(icon).unwrap_or_default()
    } else {
        IconBytes::default()
    };

    FrontmostApp {
        pid,
        bundle_id,
        name,
        icon,
    }
}

unsafe fn nsstring_to_string(nsstring: id) -> String {
    let bytes: *const std::os::raw::c_char = msg_send![nsstring, UTF8String];
    if bytes.is_null() {
        return String::new();
    }
    std::ffi::CStr::from_ptr(bytes).to_string_lossy().into_owned()
}

/// Encode an NSImage as a PNG blob via its bitmap representation.
unsafe fn nsimage_to_png(image: id) -> Option<IconBytes> {
    let tiff: id = msg_send![image, TIFFRepresentation];
    if tiff == nil {
        return None;
    }
    let rep: id = msg_send![class!(NSBitmapImageRep), imageRepWithData: tiff];
    if rep == nil {
        return None;
    }
    let png: id =
        msg_send![rep, representationUsingType: NS_BITMAP_IMAGE_FILE_TYPE_PNG properties: nil];
    if png == nil {
        return None;
    }
    let bytes: *const u8 = msg_send![png, bytes];
    let length: usize = msg_send![png, length];
    if bytes.is_null() || length == 0 {
        return None;
    }
    Some(IconBytes(std::slice::from_raw_parts(bytes, length).to_vec()))
}

// --- Input source registry ------------------------------------------------

pub fn list_activatable_sources() -> Vec<InputSourceRef> {
    unsafe {
        let filter = CFDictionary::from_CFType_pairs(&[
            (
                CFString::wrap_under_get_rule(kTISPropertyInputSourceCategory).as_CFType(),
                CFString::wrap_under_get_rule(kTISCategoryKeyboardInputSource).as_CFType(),
            ),
            (
                CFString::wrap_under_get_rule(kTISPropertyInputSourceIsSelectCapable).as_CFType(),
                CFBoolean::true_value().as_CFType(),
            ),
        ]);
        let list = TISCreateInputSourceList(filter.as_concrete_TypeRef(), 0);
        if list.is_null() {
            return Vec::new();
        }
        let count = CFArrayGetCount(list);
        let mut sources = Vec::with_capacity(count as usize);
        for index in 0..count {
            let source = CFArrayGetValueAtIndex(list, index) as TISInputSourceRef;
            if let Some(source) = source_ref(source) {
                sources.push(source);
            }
        }
        CFRelease(list as CFTypeRef);
        sources
    }
}

pub fn current_source() -> Result<InputSourceRef, SourceError> {
    unsafe {
        let source = TISCopyCurrentKeyboardInputSource();
        if source.is_null() {
            return Err(SourceError::Unavailable);
        }
        let result = source_ref(source).ok_or(SourceError::Unavailable);
        CFRelease(source as CFTypeRef);
        result
    }
}

pub fn resolve_source(id: &str) -> Result<InputSourceRef, SourceError> {
    unsafe {
        let list = copy_sources_with_id(id)?;
        let source = CFArrayGetValueAtIndex(list, 0) as TISInputSourceRef;
        let result = source_ref(source).ok_or_else(|| SourceError::NotFound(id.to_string()));
        CFRelease(list as CFTypeRef);
        result
    }
}

pub fn activate_source(id: &str) -> Result<(), SourceError> {
    unsafe {
        let list = copy_sources_with_id(id)?;
        let source = CFArrayGetValueAtIndex(list, 0) as TISInputSourceRef;
        let status = TISSelectInputSource(source);
        CFRelease(list as CFTypeRef);
        if status == 0 {
            Ok(())
        } else {
            Err(SourceError::Activation {
                id: id.to_string(),
                status,
            })
        }
    }
}

/// Non-empty input source list matching a stable identifier. Caller releases.
unsafe fn copy_sources_with_id(id: &str) -> Result<CFArrayRef, SourceError> {
    let filter = CFDictionary::from_CFType_pairs(&[(
        CFString::wrap_under_get_rule(kTISPropertyInputSourceID).as_CFType(),
        CFString::new(id).as_CFType(),
    )]);
    let list = TISCreateInputSourceList(filter.as_concrete_TypeRef(), 0);
    if list.is_null() {
        return Err(SourceError::NotFound(id.to_string()));
    }
    if CFArrayGetCount(list) == 0 {
        CFRelease(list as CFTypeRef);
        return Err(SourceError::NotFound(id.to_string()));
    }
    Ok(list)
}

unsafe fn source_ref(source: TISInputSourceRef) -> Option<InputSourceRef> {
    let id = TISGetInputSourceProperty(source, kTISPropertyInputSourceID);
    if id.is_null() {
        return None;
    }
    let id = CFString::wrap_under_get_rule(id as CFStringRef).to_string();
    Some(InputSourceRef {
        id,
        icon: source_icon(source),
    })
}

/// Read the source's icon file if it points at a PNG; other formats are
/// dropped rather than transcoded.
unsafe fn source_icon(source: TISInputSourceRef) -> IconBytes {
    let url = TISGetInputSourceProperty(source, kTISPropertyIconImageURL);
    if url.is_null() {
        return IconBytes::default();
    }
    let url = CFURL::wrap_under_get_rule(url as CFURLRef);
    let Some(path) = url.to_path() else {
        return IconBytes::default();
    };
    match std::fs::read(&path) {
        Ok(bytes) => {
            let icon = IconBytes(bytes);
            if icon.is_png() {
                icon
            } else {
                IconBytes::default()
            }
        }
        Err(_) => IconBytes::default(),
    }
}

// --- Focus observation ----------------------------------------------------

/// Context handed to the AX callback; owned by the observer handle so the
/// pointer given to the OS stays valid for exactly the observer's lifetime.
struct CallbackContext {
    tx: Sender<WatcherEvent>,
    pid: Pid,
}

extern "C" fn application_activated(
    _observer: AXObserverRef,
    _element: AXUIElementRef,
    _notification: CFStringRef,
    refcon: *mut c_void,
) {
    if refcon.is_null() {
        return;
    }
    let context = unsafe { &*(refcon as *const CallbackContext) };
    let _ = context.tx.send(WatcherEvent::FocusChanged(context.pid));
}

pub(crate) struct AxHandle {
    observer: AXObserverRef,
    element: AXUIElementRef,
    source: CFRunLoopSource,
    _context: Box<CallbackContext>,
}

pub(crate) struct AxBackend {
    tx: Sender<WatcherEvent>,
}

impl ObserverBackend for AxBackend {
    type Handle = AxHandle;

    fn register(&mut self, pid: Pid) -> Result<AxHandle, WatcherError> {
        unsafe {
            let mut observer: AXObserverRef = ptr::null_mut();
            if AXObserverCreate(pid, application_activated, &mut observer) != AX_ERROR_SUCCESS
                || observer.is_null()
            {
                return Err(WatcherError::ObserverFailed(pid));
            }

            let context = Box::new(CallbackContext {
                tx: self.tx.clone(),
                pid,
            });
            let element = AXUIElementCreateApplication(pid);
            let notification = CFString::from_static_string("AXApplicationActivated");
            let status = AXObserverAddNotification(
                observer,
                element,
                notification.as_concrete_TypeRef(),
                &*context as *const CallbackContext as *mut c_void,
            );
            if status != AX_ERROR_SUCCESS {
                CFRelease(element as CFTypeRef);
                CFRelease(observer as CFTypeRef);
                return Err(WatcherError::ObserverFailed(pid));
            }

            let source = CFRunLoopSource::wrap_under_get_rule(AXObserverGetRunLoopSource(observer));
            CFRunLoop::get_current().add_source(&source, kCFRunLoopDefaultMode);

            Ok(AxHandle {
                observer,
                element,
                source,
                _context: context,
            })
        }
    }

    fn unregister(&mut self, _pid: Pid, handle: AxHandle) {
        unsafe {
            CFRunLoop::get_current().remove_source(&handle.source, kCFRunLoopDefaultMode);
            CFRelease(handle.element as CFTypeRef);
            CFRelease(handle.observer as CFTypeRef);
        }
    }
}

/// Drive the watcher on the current (main) run loop: observe every running
/// application, keep the set current through launch/termination
/// notifications, and emit focus-change signals until the run loop stops.
pub fn run_watcher(tx: Sender<WatcherEvent>) -> Result<(), WatcherError> {
    let self_pid = std::process::id() as Pid;
    let table = Rc::new(RefCell::new(ProcessTable::new(
        AxBackend { tx: tx.clone() },
        self_pid,
    )));

    unsafe {
        let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
        let apps: id = msg_send![workspace, runningApplications];
        let count: usize = msg_send![apps, count];
        for index in 0..count {
            let app: id = msg_send![apps, objectAtIndex: index];
            let pid: Pid = msg_send![app, processIdentifier];
            table.borrow_mut().observe(pid);
        }
        info!(processes = table.borrow().len(), "observing running applications");

        let center: id = msg_send![workspace, notificationCenter];

        let launch_table = Rc::clone(&table);
        let launch_tx = tx.clone();
        let launch_block = ConcreteBlock::new(move |notification: id| {
            if let Some(pid) = pid_from_notification(notification) {
                debug!(pid, "application launched");
                launch_table.borrow_mut().observe(pid);
                let _ = launch_tx.send(WatcherEvent::FocusChanged(pid));
            }
        })
        .copy();
        let launch_name =
            NSString::alloc(nil).init_str("NSWorkspaceDidLaunchApplicationNotification");
        let launch_token: id = msg_send![center,
            addObserverForName: launch_name object: nil queue: nil usingBlock: &*launch_block];

        let terminate_table = Rc::clone(&table);
        let terminate_block = ConcreteBlock::new(move |notification: id| {
            if let Some(pid) = pid_from_notification(notification) {
                debug!(pid, "application terminated");
                terminate_table.borrow_mut().forget(pid);
            }
        })
        .copy();
        let terminate_name =
            NSString::alloc(nil).init_str("NSWorkspaceDidTerminateApplicationNotification");
        let terminate_token: id = msg_send![center,
            addObserverForName: terminate_name object: nil queue: nil usingBlock: &*terminate_block];

        // Evaluate the application that is already frontmost at startup.
        if let Some(app) = frontmost_app() {
            let _ = tx.send(WatcherEvent::FocusChanged(app.pid));
        }

        CFRunLoop::run_current();

        let _: () = msg_send![center, removeObserver: launch_token];
        let _: () = msg_send![center, removeObserver: terminate_token];
    }

    table.borrow_mut().clear();
    Ok(())
}

unsafe fn pid_from_notification(notification: id) -> Option<Pid> {
    let info: id = msg_send![notification, userInfo];
    if info == nil {
        return None;
    }
    let key = NSString::alloc(nil).init_str("NSWorkspaceApplicationKey");
    let app: id = msg_send![info, objectForKey: key];
    if app == nil {
        return None;
    }
    Some(msg_send![app, processIdentifier])
}

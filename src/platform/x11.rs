//! X11 platform
//!
//! Window enumeration through EWMH properties, screen grabs through XShm
//! (falling back to GetImage) and a duplicator that grabs whole X screens.

use super::{DesktopDuplicator, Platform, PlatformError, ScreenSource, WindowSystem};
use crate::capture::frame::{PixelBuffer, BYTES_PER_PIXEL};
use crate::region::Rect;
use crate::window::{TitleBarState, WindowId, WindowInfo};
use log::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::shm;
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt as _, ImageFormat, ImageOrder, MapState, Window,
};
use x11rb::rust_connection::RustConnection;

x11rb::atom_manager! {
    Atoms: AtomsCookie {
        _NET_CLIENT_LIST_STACKING,
        _NET_WM_NAME,
        _NET_WM_PID,
        _NET_WM_STATE,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_STATE_SKIP_TASKBAR,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_UTILITY,
        _NET_WM_WINDOW_TYPE_TOOLBAR,
        _NET_WM_WINDOW_TYPE_MENU,
        _NET_WM_WINDOW_TYPE_DOCK,
        _NET_WM_WINDOW_TYPE_DESKTOP,
    }
}

/// Owner chains longer than this are treated as broken
const MAX_TRANSIENT_DEPTH: usize = 16;

fn connect(display: Option<&str>) -> Result<(RustConnection, usize), PlatformError> {
    x11rb::connect(display).map_err(|e| PlatformError::Connection(e.to_string()))
}

fn request_error(err: impl std::fmt::Display) -> PlatformError {
    PlatformError::Request(err.to_string())
}

/// Platform factory backed by an X server
pub struct X11Platform {
    display: Option<String>,
}

impl X11Platform {
    /// `display` defaults to `$DISPLAY`
    pub fn new(display: Option<String>) -> Self {
        Self { display }
    }
}

impl Platform for X11Platform {
    fn window_system(&mut self) -> Result<Box<dyn WindowSystem>, PlatformError> {
        Ok(Box::new(X11WindowSystem::connect(self.display.as_deref())?))
    }

    fn screen_source(&mut self) -> Result<Box<dyn ScreenSource>, PlatformError> {
        Ok(Box::new(X11ScreenGrabber::connect(self.display.as_deref(), None)?))
    }

    fn duplicator(&mut self) -> Result<Box<dyn DesktopDuplicator>, PlatformError> {
        Ok(Box::new(X11Duplicator::new(self.display.clone())))
    }
}

/// Top-level windows of the default screen
pub struct X11WindowSystem {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
}

impl X11WindowSystem {
    pub fn connect(display: Option<&str>) -> Result<Self, PlatformError> {
        let (conn, screen_num) = connect(display)?;
        let root = conn.setup().roots[screen_num].root;
        let atoms = Atoms::new(&conn)
            .map_err(request_error)?
            .reply()
            .map_err(request_error)?;
        Ok(Self { conn, root, atoms })
    }

    fn property32(&self, window: Window, property: u32) -> Vec<u32> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, 1024)
            .ok()
            .and_then(|cookie| cookie.reply().ok());
        match reply {
            Some(reply) => reply.value32().map(|v| v.collect()).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn property_bytes(&self, window: Window, property: u32) -> Vec<u8> {
        self.conn
            .get_property(false, window, property, AtomEnum::ANY, 0, 4096)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|reply| reply.value)
            .unwrap_or_default()
    }

    /// Client windows bottom-most first
    fn stacking_order(&self) -> Result<Vec<Window>, PlatformError> {
        let stacking = self.property32(self.root, self.atoms._NET_CLIENT_LIST_STACKING);
        if !stacking.is_empty() {
            return Ok(stacking);
        }
        // no EWMH window manager; query_tree is bottom-to-top too
        let tree = self
            .conn
            .query_tree(self.root)
            .map_err(request_error)?
            .reply()
            .map_err(request_error)?;
        Ok(tree.children)
    }

    fn class_name(&self, window: Window) -> String {
        let raw = self.property_bytes(window, AtomEnum::WM_CLASS.into());
        // "instance\0class\0"
        raw.split(|b| *b == 0)
            .nth(1)
            .map(|class| String::from_utf8_lossy(class).into_owned())
            .unwrap_or_default()
    }

    fn title(&self, window: Window) -> String {
        let net_name = self.property_bytes(window, self.atoms._NET_WM_NAME);
        let raw = if net_name.is_empty() {
            self.property_bytes(window, AtomEnum::WM_NAME.into())
        } else {
            net_name
        };
        String::from_utf8_lossy(&raw).into_owned()
    }

    fn root_owner(&self, window: Window) -> Window {
        let mut current = window;
        for _ in 0..MAX_TRANSIENT_DEPTH {
            match self
                .property32(current, AtomEnum::WM_TRANSIENT_FOR.into())
                .first()
            {
                Some(&owner) if owner != 0 && owner != current && owner != self.root => {
                    current = owner
                }
                _ => break,
            }
        }
        current
    }

    fn bounds(&self, window: Window) -> Option<Rect> {
        let geometry = self.conn.get_geometry(window).ok()?.reply().ok()?;
        let origin = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .ok()?
            .reply()
            .ok()?;
        let left = i32::from(origin.dst_x);
        let top = i32::from(origin.dst_y);
        Some(Rect::new(
            left,
            top,
            left + i32::from(geometry.width),
            top + i32::from(geometry.height),
        ))
    }

    fn describe(&self, window: Window) -> Option<WindowInfo> {
        let attributes = self.conn.get_window_attributes(window).ok()?.reply().ok()?;
        let bounds = self.bounds(window)?;
        let id = WindowId(u64::from(window));

        let mut info = WindowInfo::new(id, &self.class_name(window), &self.title(window), bounds);
        info.visible = attributes.map_state == MapState::VIEWABLE;

        let state = self.property32(window, self.atoms._NET_WM_STATE);
        let types = self.property32(window, self.atoms._NET_WM_WINDOW_TYPE);
        info.minimized = state.contains(&self.atoms._NET_WM_STATE_HIDDEN);
        info.tool_window = state.contains(&self.atoms._NET_WM_STATE_SKIP_TASKBAR)
            || types.iter().any(|t| {
                *t == self.atoms._NET_WM_WINDOW_TYPE_UTILITY
                    || *t == self.atoms._NET_WM_WINDOW_TYPE_TOOLBAR
                    || *t == self.atoms._NET_WM_WINDOW_TYPE_MENU
            });
        if types.iter().any(|t| {
            *t == self.atoms._NET_WM_WINDOW_TYPE_DOCK || *t == self.atoms._NET_WM_WINDOW_TYPE_DESKTOP
        }) {
            info.title_bar = TitleBarState {
                invisible: true,
                focusable: false,
            };
        }

        info.root_owner = WindowId(u64::from(self.root_owner(window)));
        info.pid = self.property32(window, self.atoms._NET_WM_PID).first().copied();
        info.executable = info
            .pid
            .and_then(|pid| std::fs::read_link(format!("/proc/{}/exe", pid)).ok());
        Some(info)
    }
}

impl WindowSystem for X11WindowSystem {
    fn windows(&mut self) -> Result<Vec<WindowInfo>, PlatformError> {
        let order = self.stacking_order()?;
        // enumeration is topmost first
        Ok(order.iter().rev().filter_map(|w| self.describe(*w)).collect())
    }

    fn is_window(&mut self, id: WindowId) -> bool {
        let Ok(window) = Window::try_from(id.0) else {
            return false;
        };
        self.conn
            .get_window_attributes(window)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some()
    }

    fn virtual_screen(&mut self) -> Rect {
        let screen = self
            .conn
            .setup()
            .roots
            .iter()
            .find(|s| s.root == self.root);
        match screen {
            Some(s) => Rect::from_size(0, 0, u32::from(s.width_in_pixels), u32::from(s.height_in_pixels)),
            None => Rect::default(),
        }
    }
}

/// Pixel layout of the root window images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ImageLayout {
    bits_per_pixel: u8,
    scanline_pad: u8,
    msb_first: bool,
}

impl ImageLayout {
    fn stride(&self, width: usize) -> usize {
        let bits = width * self.bits_per_pixel as usize;
        let pad = (self.scanline_pad as usize).max(8);
        bits.div_ceil(pad) * pad / 8
    }
}

/// Convert a Z-pixmap image to a BGRA pixel buffer
fn to_pixel_buffer(
    src: &[u8],
    width: u32,
    height: u32,
    layout: ImageLayout,
) -> Result<PixelBuffer, PlatformError> {
    let src_stride = layout.stride(width as usize);
    if src.len() < src_stride * height as usize {
        return Err(PlatformError::Request(format!(
            "short image: {} bytes for {}x{}",
            src.len(),
            width,
            height
        )));
    }

    let mut out = PixelBuffer::filled(width, height, 0xFF00_0000);
    for y in 0..height {
        let row = &src[y as usize * src_stride..];
        let dst = out.row_mut(y);
        for x in 0..width as usize {
            let (r, g, b) = match layout.bits_per_pixel {
                32 => {
                    let p = &row[x * 4..x * 4 + 4];
                    if layout.msb_first {
                        (p[1], p[2], p[3])
                    } else {
                        (p[2], p[1], p[0])
                    }
                }
                24 => {
                    let p = &row[x * 3..x * 3 + 3];
                    if layout.msb_first {
                        (p[0], p[1], p[2])
                    } else {
                        (p[2], p[1], p[0])
                    }
                }
                16 => {
                    let bytes = [row[x * 2], row[x * 2 + 1]];
                    let pixel = if layout.msb_first {
                        u16::from_be_bytes(bytes)
                    } else {
                        u16::from_le_bytes(bytes)
                    };
                    let r = ((pixel >> 11) & 0x1F) as u8;
                    let g = ((pixel >> 5) & 0x3F) as u8;
                    let b = (pixel & 0x1F) as u8;
                    (r << 3 | r >> 2, g << 2 | g >> 4, b << 3 | b >> 2)
                }
                other => {
                    return Err(PlatformError::Unsupported(format!("{} bits per pixel", other)))
                }
            };
            let o = x * BYTES_PER_PIXEL;
            dst[o..o + BYTES_PER_PIXEL].copy_from_slice(&[b, g, r, 0xFF]);
        }
    }
    Ok(out)
}

/// SysV shared memory segment attached to the X server
struct ShmSegment {
    seg: shm::Seg,
    shmid: i32,
    addr: *mut u8,
    size: usize,
}

// The mapping is owned by the grabber and only touched from its thread.
unsafe impl Send for ShmSegment {}

impl ShmSegment {
    fn attach(conn: &RustConnection, size: usize) -> Option<Self> {
        shm::query_version(conn).ok()?.reply().ok()?;
        let seg = conn.generate_id().ok()?;

        let shmid = unsafe { libc::shmget(libc::IPC_PRIVATE, size, libc::IPC_CREAT | 0o600) };
        if shmid < 0 {
            return None;
        }

        let addr = unsafe { libc::shmat(shmid, std::ptr::null(), 0) };
        if addr as isize == -1 {
            unsafe {
                libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
            return None;
        }

        let attached = shm::attach(conn, seg, shmid as u32, false)
            .ok()
            .and_then(|cookie| cookie.check().ok());
        if attached.is_none() {
            unsafe {
                libc::shmdt(addr);
                libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
            return None;
        }

        Some(Self {
            seg,
            shmid,
            addr: addr as *mut u8,
            size,
        })
    }

    fn data(&self, len: usize) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.addr as *const u8, len.min(self.size)) }
    }

    fn release(&mut self, conn: &RustConnection) {
        let _ = shm::detach(conn, self.seg);
        unsafe {
            libc::shmdt(self.addr as *const libc::c_void);
            libc::shmctl(self.shmid, libc::IPC_RMID, std::ptr::null_mut());
        }
    }
}

/// Root-window pixel grabber for one X screen
pub struct X11ScreenGrabber {
    conn: RustConnection,
    root: Window,
    width: u16,
    height: u16,
    layout: ImageLayout,
    shm: Option<ShmSegment>,
}

impl X11ScreenGrabber {
    /// Connect and bind screen `screen` (default screen when `None`)
    pub fn connect(display: Option<&str>, screen: Option<usize>) -> Result<Self, PlatformError> {
        let (conn, default_screen) = connect(display)?;
        let screen_num = screen.unwrap_or(default_screen);
        let setup = conn.setup();
        let Some(screen) = setup.roots.get(screen_num) else {
            return Err(PlatformError::NotFound(format!("X screen {}", screen_num)));
        };
        let root = screen.root;
        let width = screen.width_in_pixels;
        let height = screen.height_in_pixels;
        let depth = screen.root_depth;

        let format = setup.pixmap_formats.iter().find(|f| f.depth == depth);
        let layout = ImageLayout {
            bits_per_pixel: format.map_or(32, |f| f.bits_per_pixel),
            scanline_pad: format.map_or(32, |f| f.scanline_pad),
            msb_first: setup.image_byte_order == ImageOrder::MSB_FIRST,
        };

        let size = layout.stride(width as usize) * height as usize;
        let shm = ShmSegment::attach(&conn, size);
        if shm.is_some() {
            debug!("Using XShm capture");
        } else {
            debug!("XShm not available, using XGetImage");
        }
        info!(
            "X11 screen {}: {}x{} depth {} ({} bpp)",
            screen_num, width, height, depth, layout.bits_per_pixel
        );

        Ok(Self {
            conn,
            root,
            width,
            height,
            layout,
            shm,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (u32::from(self.width), u32::from(self.height))
    }

    /// Grab `rect`, clipped to the screen
    pub fn grab_rect(&mut self, rect: Rect) -> Result<PixelBuffer, PlatformError> {
        let screen = Rect::from_size(0, 0, u32::from(self.width), u32::from(self.height));
        let Some(clipped) = rect.intersect(&screen) else {
            return Err(PlatformError::NotFound(format!("{} is off screen", rect)));
        };
        let (x, y) = (clipped.left as i16, clipped.top as i16);
        let (w, h) = (clipped.width() as u16, clipped.height() as u16);

        if let Some(seg) = &self.shm {
            let reply = shm::get_image(
                &self.conn,
                self.root,
                x,
                y,
                w,
                h,
                u32::MAX,
                u8::from(ImageFormat::Z_PIXMAP),
                seg.seg,
                0,
            )
            .map_err(request_error)?
            .reply()
            .map_err(request_error)?;
            let len = (reply.size as usize).min(self.layout.stride(w as usize) * h as usize);
            return to_pixel_buffer(seg.data(len), u32::from(w), u32::from(h), self.layout);
        }

        let image = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, self.root, x, y, w, h, u32::MAX)
            .map_err(request_error)?
            .reply()
            .map_err(request_error)?;
        to_pixel_buffer(&image.data, u32::from(w), u32::from(h), self.layout)
    }
}

impl ScreenSource for X11ScreenGrabber {
    fn grab(&mut self, rect: Rect) -> Option<PixelBuffer> {
        match self.grab_rect(rect) {
            Ok(buffer) => Some(buffer),
            Err(err) => {
                debug!("screen grab failed: {}", err);
                None
            }
        }
    }
}

impl Drop for X11ScreenGrabber {
    fn drop(&mut self) {
        if let Some(mut seg) = self.shm.take() {
            seg.release(&self.conn);
        }
    }
}

/// Whole-screen duplication; the adapter index picks the X screen
pub struct X11Duplicator {
    display: Option<String>,
    grabber: Option<X11ScreenGrabber>,
}

impl X11Duplicator {
    pub fn new(display: Option<String>) -> Self {
        Self {
            display,
            grabber: None,
        }
    }
}

impl DesktopDuplicator for X11Duplicator {
    fn open(&mut self, adapter: u32, desktop: u32) -> Result<(), PlatformError> {
        if desktop != 0 {
            return Err(PlatformError::NotFound(format!(
                "desktop {} on adapter {}",
                desktop, adapter
            )));
        }
        let grabber = X11ScreenGrabber::connect(self.display.as_deref(), Some(adapter as usize))?;
        self.grabber = Some(grabber);
        Ok(())
    }

    fn acquire(&mut self) -> Result<Option<PixelBuffer>, PlatformError> {
        let Some(grabber) = self.grabber.as_mut() else {
            return Err(PlatformError::AccessLost);
        };
        let (width, height) = grabber.dimensions();
        let full = Rect::from_size(0, 0, width, height);
        match grabber.grab_rect(full) {
            Ok(buffer) => Ok(Some(buffer)),
            Err(PlatformError::Request(msg)) => {
                debug!("duplication lost: {}", msg);
                Err(PlatformError::AccessLost)
            }
            Err(err) => Err(err),
        }
    }

    fn close(&mut self) {
        self.grabber = None;
    }
}

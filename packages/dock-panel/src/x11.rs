//! X11 window-system glue over x11rb.

use dock_core::snapshot::{FrameExtents, WindowSystem, WindowSystemError};
use dock_core::{Rect, Size, WindowId};
use image::RgbaImage;
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::CURRENT_TIME;

struct Atoms {
    cardinal: Atom,
    compositor: Atom,
    net_close_window: Atom,
    net_wm_icon_geometry: Atom,
    gtk_frame_extents: Atom,
}

impl Atoms {
    fn new(conn: &RustConnection, screen: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let intern = |name: &[u8]| -> Result<Atom, Box<dyn std::error::Error>> {
            Ok(conn.intern_atom(false, name)?.reply()?.atom)
        };
        Ok(Self {
            cardinal: intern(b"CARDINAL")?,
            compositor: intern(format!("_NET_WM_CM_S{}", screen).as_bytes())?,
            net_close_window: intern(b"_NET_CLOSE_WINDOW")?,
            net_wm_icon_geometry: intern(b"_NET_WM_ICON_GEOMETRY")?,
            gtk_frame_extents: intern(b"_GTK_FRAME_EXTENTS")?,
        })
    }
}

fn request_failed(e: impl std::fmt::Display) -> WindowSystemError {
    WindowSystemError::Request(e.to_string())
}

/// An X protocol error on a window request means the window is gone.
fn reply_failed(window: WindowId, e: ReplyError) -> WindowSystemError {
    match e {
        ReplyError::X11Error(_) => WindowSystemError::WindowGone(window),
        ReplyError::ConnectionError(e) => request_failed(e),
    }
}

pub struct X11WindowSystem {
    conn: RustConnection,
    root: Window,
    screen: Rect,
    atoms: Atoms,
}

impl X11WindowSystem {
    /// Connect to `$DISPLAY`.
    pub fn connect() -> Result<Self, Box<dyn std::error::Error>> {
        let (conn, screen_num) = RustConnection::connect(None)?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let geometry = Rect::new(0, 0, screen.width_in_pixels.into(), screen.height_in_pixels.into());
        let atoms = Atoms::new(&conn, screen_num)?;
        tracing::info!(root, width = geometry.width, height = geometry.height, "connected to X server");
        Ok(Self {
            conn,
            root,
            screen: geometry,
            atoms,
        })
    }

    /// Root window geometry
    pub fn screen(&self) -> Rect {
        self.screen
    }
}

impl WindowSystem for X11WindowSystem {
    fn has_composite(&self) -> bool {
        match self
            .conn
            .get_selection_owner(self.atoms.compositor)
            .map_err(request_failed)
            .and_then(|cookie| cookie.reply().map_err(request_failed))
        {
            Ok(reply) => reply.owner != x11rb::NONE,
            Err(e) => {
                tracing::debug!(error = %e, "compositor query failed");
                false
            }
        }
    }

    fn window_geometry(&self, window: WindowId) -> Result<Rect, WindowSystemError> {
        let geometry = self
            .conn
            .get_geometry(window)
            .map_err(request_failed)?
            .reply()
            .map_err(|e| reply_failed(window, e))?;
        let origin = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .map_err(request_failed)?
            .reply()
            .map_err(|e| reply_failed(window, e))?;
        Ok(Rect::new(
            origin.dst_x.into(),
            origin.dst_y.into(),
            geometry.width.into(),
            geometry.height.into(),
        ))
    }

    fn grab_pixels(&self, window: WindowId, size: Size) -> Result<RgbaImage, WindowSystemError> {
        if size.is_empty() {
            return Err(WindowSystemError::ZeroSize(window));
        }
        let width = u16::try_from(size.width).map_err(request_failed)?;
        let height = u16::try_from(size.height).map_err(request_failed)?;
        let image = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, window, 0, 0, width, height, !0)
            .map_err(request_failed)?
            .reply()
            .map_err(|e| reply_failed(window, e))?;

        let pixels = size.width as usize * size.height as usize;
        if image.data.len() < pixels * 4 {
            return Err(WindowSystemError::Request(format!(
                "unsupported image depth {} for window {:#x}",
                image.depth, window
            )));
        }
        // 24 and 32 bit visuals come back as little-endian BGRX / BGRA
        let has_alpha = image.depth == 32;
        let rgba: Vec<u8> = image.data[..pixels * 4]
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0], if has_alpha { px[3] } else { 0xff }])
            .collect();
        RgbaImage::from_raw(size.width, size.height, rgba)
            .ok_or_else(|| WindowSystemError::Request("image buffer size mismatch".to_string()))
    }

    fn frame_extents(&self, window: WindowId) -> Option<FrameExtents> {
        let reply = self
            .conn
            .get_property(false, window, self.atoms.gtk_frame_extents, self.atoms.cardinal, 0, 4)
            .ok()?
            .reply()
            .ok()?;
        let values: Vec<u32> = reply.value32()?.collect();
        match values[..] {
            [left, right, top, bottom] => Some(FrameExtents {
                left,
                right,
                top,
                bottom,
            }),
            _ => None,
        }
    }

    fn close_window(&self, window: WindowId) -> Result<(), WindowSystemError> {
        // source indication 2: request from a pager
        let event = ClientMessageEvent::new(32, window, self.atoms.net_close_window, [CURRENT_TIME, 2, 0, 0, 0]);
        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
                event,
            )
            .map_err(request_failed)?;
        self.conn.flush().map_err(request_failed)?;
        tracing::debug!(window, "close requested");
        Ok(())
    }

    fn set_icon_geometry(&self, window: WindowId, rect: Rect) -> Result<(), WindowSystemError> {
        let data = [rect.x as u32, rect.y as u32, rect.width, rect.height];
        self.conn
            .change_property32(
                PropMode::REPLACE,
                window,
                self.atoms.net_wm_icon_geometry,
                self.atoms.cardinal,
                &data,
            )
            .map_err(request_failed)?;
        self.conn.flush().map_err(request_failed)
    }
}

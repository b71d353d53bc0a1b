//! EWMH window listing over X11

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

use crate::error::{GuardianError, Result};
use crate::WindowInfo;

fn x11_err(e: impl std::fmt::Display) -> GuardianError {
    GuardianError::Enumeration(format!("X11: {}", e))
}

struct Desktop {
    conn: RustConnection,
    root: Window,
}

impl Desktop {
    fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).map_err(x11_err)?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| x11_err("no such screen"))?;
        Ok(Self { conn, root })
    }

    fn atom(&self, name: &str) -> Result<Atom> {
        Ok(self
            .conn
            .intern_atom(false, name.as_bytes())
            .map_err(x11_err)?
            .reply()
            .map_err(x11_err)?
            .atom)
    }

    fn property32(&self, window: Window, property: Atom, kind: AtomEnum) -> Result<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, property, kind, 0, u32::MAX / 4)
            .map_err(x11_err)?
            .reply()
            .map_err(x11_err)?;
        Ok(reply.value32().map(|v| v.collect()).unwrap_or_default())
    }

    fn text(&self, window: Window, property: Atom) -> Result<Option<String>> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, 1024)
            .map_err(x11_err)?
            .reply()
            .map_err(x11_err)?;
        if reply.value.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&reply.value).into_owned()))
    }
}

/// All managed top-level windows with title, focus and hidden state.
pub(super) fn list_windows() -> Result<Vec<WindowInfo>> {
    let desktop = Desktop::connect()?;
    let client_list = desktop.atom("_NET_CLIENT_LIST")?;
    let active_atom = desktop.atom("_NET_ACTIVE_WINDOW")?;
    let net_wm_name = desktop.atom("_NET_WM_NAME")?;
    let wm_state = desktop.atom("_NET_WM_STATE")?;
    let hidden = desktop.atom("_NET_WM_STATE_HIDDEN")?;

    let windows = desktop.property32(desktop.root, client_list, AtomEnum::WINDOW)?;
    let active = desktop
        .property32(desktop.root, active_atom, AtomEnum::WINDOW)?
        .first()
        .copied();

    let mut out = Vec::with_capacity(windows.len());
    for window in windows {
        // Windows can vanish between listing and querying
        let title = match desktop.text(window, net_wm_name) {
            Ok(Some(title)) => title,
            Ok(None) => desktop
                .text(window, AtomEnum::WM_NAME.into())
                .ok()
                .flatten()
                .unwrap_or_default(),
            Err(_) => continue,
        };
        let states = desktop
            .property32(window, wm_state, AtomEnum::ATOM)
            .unwrap_or_default();

        out.push(WindowInfo {
            id: Some(u64::from(window)),
            title: title.trim_end_matches('\0').to_string(),
            is_minimized: states.contains(&hidden),
            is_focused: active == Some(window),
        });
    }
    Ok(out)
}

//! Interned atoms
//!
//! Every atom the backend uses is interned once while connecting. The cache
//! is immutable afterwards; a name the server cannot intern fails the
//! connection instead of leaving a zero atom behind.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt};

use crate::error::{PlatformError, Result};

macro_rules! atom_cache {
    ($(#[$meta:meta])* pub struct $name:ident { $($atom:ident),* $(,)? }) => {
        $(#[$meta])*
        #[allow(non_snake_case)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            $(pub $atom: Atom,)*
        }

        impl $name {
            /// Atom names in field order
            pub const NAMES: &'static [&'static str] = &[$(stringify!($atom)),*];

            /// Build the cache from a name lookup
            pub fn resolve(mut lookup: impl FnMut(&str) -> Option<Atom>) -> Result<Self> {
                Ok(Self {
                    $($atom: match lookup(stringify!($atom)) {
                        Some(atom) if atom != x11rb::NONE => atom,
                        _ => return Err(PlatformError::ProtocolMissing(
                            format!("atom {}", stringify!($atom)),
                        )),
                    },)*
                })
            }
        }
    };
}

atom_cache! {
    /// Atoms used by the X11 backend
    pub struct Atoms {
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        UTF8_STRING,
        _NET_WM_NAME,
        _NET_WM_PING,
        _NET_WM_STATE,
        _NET_WM_STATE_ABOVE,
        _NET_ACTIVE_WINDOW,
        _NET_WORKAREA,
        _MOTIF_WM_HINTS,
        CLIPBOARD,
        TARGETS,
        TEXT,
        INCR,
        LUMINA_SELECTION,
    }
}

impl Atoms {
    /// Intern every atom, sending all requests before reading any reply
    pub fn intern<C: Connection>(conn: &C) -> Result<Self> {
        let cookies = Self::NAMES
            .iter()
            .map(|name| conn.intern_atom(false, name.as_bytes()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut interned = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            interned.push(cookie.reply()?.atom);
        }

        Self::resolve(|name| {
            Self::NAMES
                .iter()
                .position(|candidate| *candidate == name)
                .map(|idx| interned[idx])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_all_present() {
        let atoms = Atoms::resolve(|name| {
            Atoms::NAMES
                .iter()
                .position(|n| *n == name)
                .map(|idx| 300 + idx as Atom)
        })
        .unwrap();

        assert_eq!(atoms.WM_PROTOCOLS, 300);
        assert_eq!(atoms.LUMINA_SELECTION, 300 + Atoms::NAMES.len() as Atom - 1);
    }

    #[test]
    fn test_missing_atom_fails() {
        let err = Atoms::resolve(|name| (name != "CLIPBOARD").then_some(42)).unwrap_err();
        match err {
            PlatformError::ProtocolMissing(what) => assert_eq!(what, "atom CLIPBOARD"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_zero_atom_fails() {
        let result = Atoms::resolve(|name| Some(if name == "TARGETS" { 0 } else { 7 }));
        assert!(matches!(result, Err(PlatformError::ProtocolMissing(_))));
    }

    #[test]
    fn test_names_are_unique() {
        let mut names = Atoms::NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Atoms::NAMES.len());
    }
}

//! Method bit-flags used as keys into a trie leaf's endpoint map.
//!
//! A leaf stores at most one endpoint per bit, so "register under every
//! method" and "register under this one method" are the same operation
//! at different granularities.

/// A set of HTTP methods, represented as a bitmask.
pub type Mask = u16;

pub const GET: Mask = 1 << 0;
pub const POST: Mask = 1 << 1;
pub const PUT: Mask = 1 << 2;
pub const PATCH: Mask = 1 << 3;
pub const DELETE: Mask = 1 << 4;
pub const HEAD: Mask = 1 << 5;
pub const OPTIONS: Mask = 1 << 6;
pub const CONNECT: Mask = 1 << 7;
pub const TRACE: Mask = 1 << 8;

/// Reserved for mount-point stubs. Never matched against an incoming
/// request's method directly; a leaf carrying this bit is recognized by the
/// dispatcher as "delegate to the mounted sub-router" rather than executed.
pub const STUB: Mask = 1 << 9;

/// Every concrete method bit this crate understands, OR'd together.
/// Installing a handler under `ALL` is shorthand for installing the same
/// handler under each of these.
pub const ALL: Mask = GET | POST | PUT | PATCH | DELETE | HEAD | OPTIONS | CONNECT | TRACE;

const CONCRETE: &[Mask] = &[GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS, CONNECT, TRACE];

/// Maps a [`http::Method`] to its bit, or `None` if the method isn't one of
/// the nine this crate assigns a bit to.
pub fn bit_for(method: &http::Method) -> Option<Mask> {
    Some(match method.as_str() {
        "GET" => GET,
        "POST" => POST,
        "PUT" => PUT,
        "PATCH" => PATCH,
        "DELETE" => DELETE,
        "HEAD" => HEAD,
        "OPTIONS" => OPTIONS,
        "CONNECT" => CONNECT,
        "TRACE" => TRACE,
        _ => return None,
    })
}

/// The inverse of [`bit_for`]; only ever called with a single concrete bit.
pub fn method_for(bit: Mask) -> Option<http::Method> {
    Some(match bit {
        GET => http::Method::GET,
        POST => http::Method::POST,
        PUT => http::Method::PUT,
        PATCH => http::Method::PATCH,
        DELETE => http::Method::DELETE,
        HEAD => http::Method::HEAD,
        OPTIONS => http::Method::OPTIONS,
        CONNECT => http::Method::CONNECT,
        TRACE => http::Method::TRACE,
        _ => return None,
    })
}

/// Iterates the individual set bits of `mask`, in the fixed order above plus
/// [`STUB`] last.
pub fn decompose(mask: Mask) -> impl Iterator<Item = Mask> {
    CONCRETE
        .iter()
        .copied()
        .chain(std::iter::once(STUB))
        .filter(move |&bit| mask & bit != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_for_round_trips_through_method_for() {
        for &bit in CONCRETE {
            let method = method_for(bit).unwrap();
            assert_eq!(bit_for(&method), Some(bit));
        }
    }

    #[test]
    fn bit_for_rejects_unknown_methods() {
        let method = http::Method::from_bytes(b"PROPFIND").unwrap();
        assert_eq!(bit_for(&method), None);
    }

    #[test]
    fn decompose_splits_all_into_every_concrete_bit() {
        let bits: Vec<_> = decompose(ALL).collect();
        assert_eq!(bits.len(), 9);
        assert!(!bits.contains(&STUB));
    }

    #[test]
    fn decompose_keeps_stub_alongside_all() {
        let bits: Vec<_> = decompose(STUB | ALL).collect();
        assert_eq!(bits.len(), 10);
        assert!(bits.contains(&STUB));
    }
}

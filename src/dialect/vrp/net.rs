//! IPv4 network-form parsing and normalization.
//!
//! Operators hand the engine a network in one of three accepted spellings:
//! CIDR (`10.0.0.0/24`), explicit mask (`10.0.0.0 mask 255.255.255.0`), or a
//! bare address whose mask was agreed out of band. The first two normalize to
//! the same `network <ip> mask <dotted>` command line.

use std::net::Ipv4Addr;
use std::str::FromStr;

/// A parsed network parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkForm {
    /// `A.B.C.D/prefix`
    Cidr {
        /// Network address
        addr: Ipv4Addr,
        /// Prefix length, 0..=32
        prefix: u8,
    },
    /// `A.B.C.D mask E.F.G.H`
    Masked {
        /// Network address
        addr: Ipv4Addr,
        /// Dotted-decimal mask, contiguous
        mask: Ipv4Addr,
    },
    /// Bare `A.B.C.D`; the mask was agreed externally.
    Bare {
        /// Network address
        addr: Ipv4Addr,
    },
}

impl NetworkForm {
    /// The normalized `network …` command line for this form.
    pub fn command_line(&self) -> String {
        match self {
            NetworkForm::Cidr { addr, prefix } => {
                format!("network {} mask {}", addr, mask_from_prefix(*prefix))
            }
            NetworkForm::Masked { addr, mask } => format!("network {} mask {}", addr, mask),
            NetworkForm::Bare { addr } => format!("network {}", addr),
        }
    }
}

impl FromStr for NetworkForm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((addr, prefix)) = s.split_once('/') {
            let addr: Ipv4Addr = addr
                .trim()
                .parse()
                .map_err(|_| format!("invalid network address '{}'", addr))?;
            let prefix: u8 = prefix
                .trim()
                .parse()
                .map_err(|_| format!("invalid prefix '{}'", prefix))?;
            if prefix > 32 {
                return Err(format!("prefix /{} out of range 0..=32", prefix));
            }
            return Ok(NetworkForm::Cidr { addr, prefix });
        }

        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(addr), None, None, None) => {
                let addr: Ipv4Addr = addr
                    .parse()
                    .map_err(|_| format!("invalid network address '{}'", addr))?;
                Ok(NetworkForm::Bare { addr })
            }
            (Some(addr), Some(kw), Some(mask), None) if kw.eq_ignore_ascii_case("mask") => {
                let addr: Ipv4Addr = addr
                    .parse()
                    .map_err(|_| format!("invalid network address '{}'", addr))?;
                let mask: Ipv4Addr = mask
                    .parse()
                    .map_err(|_| format!("invalid mask '{}'", mask))?;
                if prefix_from_mask(mask).is_none() {
                    return Err(format!("mask {} is not contiguous", mask));
                }
                Ok(NetworkForm::Masked { addr, mask })
            }
            _ => Err(format!(
                "expected 'A.B.C.D/prefix', 'A.B.C.D mask E.F.G.H' or 'A.B.C.D', got '{}'",
                s
            )),
        }
    }
}

/// Dotted-decimal mask for a prefix length: `(0xFFFFFFFF << (32-n)) & 0xFFFFFFFF`.
pub fn mask_from_prefix(prefix: u8) -> Ipv4Addr {
    debug_assert!(prefix <= 32);
    let bits = 0xFFFF_FFFFu32
        .checked_shl(u32::from(32 - prefix.min(32)))
        .unwrap_or(0);
    Ipv4Addr::from(bits)
}

/// Prefix length for a contiguous mask; `None` for a non-contiguous one.
pub fn prefix_from_mask(mask: Ipv4Addr) -> Option<u8> {
    let bits = u32::from(mask);
    let ones = bits.leading_ones() as u8;
    if mask_from_prefix(ones) == mask {
        Some(ones)
    } else {
        None
    }
}

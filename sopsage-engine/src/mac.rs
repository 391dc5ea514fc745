//! Canonical plaintext encoding fed to the document MAC.
//!
//! Every node is written as a type byte followed by its value; strings, keys
//! and container sizes are length-prefixed (u64, big endian), so two
//! different trees never encode to the same bytes. Key order is significant.

use crate::error::{SopsError, SopsResult};
use crate::tree::{Node, Scalar};
use sopsage_crypto::{DataKey, DocumentMac, MAC_SIZE};

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_SEQUENCE: u8 = 0x05;
const TAG_MAPPING: u8 = 0x06;

/// Computes the MAC of a plaintext tree stamped with `lastmodified`.
pub fn compute(root: &Node, lastmodified: &str, key: &DataKey) -> SopsResult<[u8; MAC_SIZE]> {
    let mut mac = DocumentMac::new(key)?;
    feed(&mut mac, root, lastmodified);
    Ok(mac.finalize())
}

/// Verifies `expected` in constant time.
pub fn verify(root: &Node, lastmodified: &str, key: &DataKey, expected: &[u8]) -> SopsResult<()> {
    let mut mac = DocumentMac::new(key)?;
    feed(&mut mac, root, lastmodified);
    mac.verify(expected)
        .map_err(|_| SopsError::authentication("document MAC does not match its content"))
}

fn feed(mac: &mut DocumentMac, root: &Node, lastmodified: &str) {
    write_str(mac, lastmodified);
    write_node(mac, root);
}

fn write_len(mac: &mut DocumentMac, len: usize) {
    mac.update(&(len as u64).to_be_bytes());
}

fn write_str(mac: &mut DocumentMac, s: &str) {
    write_len(mac, s.len());
    mac.update(s.as_bytes());
}

fn write_node(mac: &mut DocumentMac, node: &Node) {
    match node {
        Node::Scalar(Scalar::Null) => mac.update(&[TAG_NULL]),
        Node::Scalar(Scalar::Bool(b)) => mac.update(&[TAG_BOOL, u8::from(*b)]),
        Node::Scalar(Scalar::Int(i)) => {
            mac.update(&[TAG_INT]);
            mac.update(&i.to_be_bytes());
        }
        Node::Scalar(Scalar::Float(f)) => {
            mac.update(&[TAG_FLOAT]);
            mac.update(&f.to_bits().to_be_bytes());
        }
        Node::Scalar(Scalar::String(s)) => {
            mac.update(&[TAG_STRING]);
            write_str(mac, s);
        }
        Node::Sequence(items) => {
            mac.update(&[TAG_SEQUENCE]);
            write_len(mac, items.len());
            for item in items {
                write_node(mac, item);
            }
        }
        Node::Mapping(map) => {
            mac.update(&[TAG_MAPPING]);
            write_len(mac, map.len());
            for (key, value) in map {
                write_str(mac, key);
                write_node(mac, value);
            }
        }
    }
}

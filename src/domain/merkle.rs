//! Merkle tree over payout leaves.
//!
//! Domain-separated blake3 hashing: leaves are hashed with a `0x00` prefix
//! and interior nodes with `0x01`, which prevents a crafted leaf from being
//! replayed as an interior node. Odd layers duplicate their last element.
//! Proofs are sibling paths verified by index parity per level.

use serde::{Deserialize, Serialize};

use super::ids::WalletAddress;

/// 32-byte blake3 digest.
pub type Digest = [u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hashes a `(wallet, amount)` payout leaf.
#[must_use]
pub fn leaf_hash(wallet: &WalletAddress, amount: u64) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(wallet.as_str().as_bytes());
    hasher.update(&amount.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Hashes an interior node from its two children.
#[must_use]
pub fn node_hash(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Hex form of a digest, `0x`-prefixed.
#[must_use]
pub fn digest_hex(digest: &Digest) -> String {
    let mut out = String::with_capacity(66);
    out.push_str("0x");
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// One sibling step in a merkle proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Sibling digest at this level.
    pub sibling: Digest,
    /// `true` when the sibling sits to the left of the running hash.
    pub sibling_is_left: bool,
}

/// Merkle tree built bottom-up over a fixed leaf set.
///
/// All layers are retained so per-recipient proofs can be extracted after
/// the build without rehashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    layers: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Builds a tree from leaf digests. Returns `None` for an empty set.
    #[must_use]
    pub fn build(leaves: Vec<Digest>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }
        let mut layers = vec![leaves];
        loop {
            let Some(current) = layers.last() else {
                return None;
            };
            if current.len() == 1 {
                break;
            }
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            let mut chunks = current.chunks(2);
            for pair in &mut chunks {
                let digest = match pair {
                    [left, right] => node_hash(left, right),
                    // Odd layer: the trailing element pairs with itself.
                    [only] => node_hash(only, only),
                    _ => return None,
                };
                next.push(digest);
            }
            layers.push(next);
        }
        Some(Self { layers })
    }

    /// Root digest.
    #[must_use]
    pub fn root(&self) -> Digest {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    /// Number of leaves.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.layers.first().map_or(0, Vec::len)
    }

    /// Extracts the sibling path for the leaf at `index`.
    #[must_use]
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut steps = Vec::new();
        let mut position = index;
        // Every layer except the root contributes one sibling.
        for layer in self.layers.iter().take(self.layers.len().saturating_sub(1)) {
            let sibling_index = if position % 2 == 0 {
                position + 1
            } else {
                position - 1
            };
            // Odd layer ends pair with themselves.
            let sibling = layer
                .get(sibling_index)
                .or_else(|| layer.get(position))
                .copied()?;
            steps.push(ProofStep {
                sibling,
                sibling_is_left: position % 2 == 1,
            });
            position /= 2;
        }
        Some(steps)
    }
}

/// Recomputes a root from a leaf digest and proof, comparing against
/// `expected_root`.
#[must_use]
pub fn verify_proof(leaf: &Digest, proof: &[ProofStep], expected_root: &Digest) -> bool {
    let mut running = *leaf;
    for step in proof {
        running = if step.sibling_is_left {
            node_hash(&step.sibling, &running)
        } else {
            node_hash(&running, &step.sibling)
        };
    }
    running == *expected_root
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn wallet(n: u8) -> WalletAddress {
        let addr = WalletAddress::parse(&format!("0x{:040x}", u128::from(n) + 1)).ok();
        let Some(addr) = addr else {
            panic!("valid wallet");
        };
        addr
    }

    fn leaves(n: u8) -> Vec<Digest> {
        (0..n).map(|i| leaf_hash(&wallet(i), u64::from(i) * 10)).collect()
    }

    #[test]
    fn empty_set_has_no_tree() {
        assert!(MerkleTree::build(Vec::new()).is_none());
    }

    #[test]
    fn single_leaf_root_is_leaf() {
        let leaf = leaf_hash(&wallet(0), 100);
        let Some(tree) = MerkleTree::build(vec![leaf]) else {
            panic!("build failed");
        };
        assert_eq!(tree.root(), leaf);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn all_proofs_verify() {
        for n in [2u8, 3, 4, 5, 7, 8] {
            let set = leaves(n);
            let Some(tree) = MerkleTree::build(set.clone()) else {
                panic!("build failed");
            };
            let root = tree.root();
            for (i, leaf) in set.iter().enumerate() {
                let Some(proof) = tree.proof(i) else {
                    panic!("missing proof for {i} of {n}");
                };
                assert!(verify_proof(leaf, &proof, &root), "proof {i} of {n}");
            }
        }
    }

    #[test]
    fn wrong_leaf_fails_verification() {
        let set = leaves(4);
        let Some(tree) = MerkleTree::build(set) else {
            panic!("build failed");
        };
        let Some(proof) = tree.proof(0) else {
            panic!("missing proof");
        };
        let forged = leaf_hash(&wallet(9), 999);
        assert!(!verify_proof(&forged, &proof, &tree.root()));
    }

    #[test]
    fn proof_index_out_of_range() {
        let Some(tree) = MerkleTree::build(leaves(3)) else {
            panic!("build failed");
        };
        assert!(tree.proof(3).is_none());
    }

    #[test]
    fn leaf_and_node_domains_differ() {
        let a = leaf_hash(&wallet(1), 5);
        let b = leaf_hash(&wallet(1), 5);
        assert_eq!(a, b);
        assert_ne!(node_hash(&a, &b), leaf_hash(&wallet(1), 5));
    }

    #[test]
    fn digest_hex_format() {
        let hex = digest_hex(&[0xab; 32]);
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);
    }
}

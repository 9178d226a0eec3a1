//! Signer key material on disk.
//!
//! The trusted dealer (`tesserad keygen`) produces one roster file naming
//! the group key and every signer's public share, plus one secret share
//! file per signer. The roster is public; share files go to their signers
//! over a secure channel and nowhere else.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tessera_crypto::{generate_shares, GroupPublicKey, PublicShare, SecretShare};
use tessera_quorum::threshold_for;
use tracing::info;

/// The public half of the signer set: group key and verification shares.
pub struct Roster {
    pub group_key: GroupPublicKey,
    pub public_shares: Vec<PublicShare>,
}

impl Roster {
    /// Shares required for a valid checkpoint signature.
    pub fn threshold(&self) -> u16 {
        threshold_for(self.public_shares.len())
    }
}

#[derive(Serialize, Deserialize)]
struct RosterFile {
    /// Compressed group public key, hex.
    group_key: String,
    signers: Vec<RosterEntry>,
}

#[derive(Serialize, Deserialize)]
struct RosterEntry {
    index: u16,
    /// Compressed verification key, hex.
    public_key: String,
}

/// Load a roster file.
pub fn load_roster(path: &Path) -> Result<Roster> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read roster at {}", path.display()))?;
    let file: RosterFile = toml::from_str(&content).context("malformed roster file")?;

    let group_key = GroupPublicKey::from_bytes(&hex::decode(&file.group_key)?)
        .context("invalid group key in roster")?;
    let mut public_shares = Vec::with_capacity(file.signers.len());
    for entry in &file.signers {
        let share = PublicShare::from_bytes(entry.index, &hex::decode(&entry.public_key)?)
            .with_context(|| format!("invalid public share for signer {}", entry.index))?;
        public_shares.push(share);
    }
    Ok(Roster {
        group_key,
        public_shares,
    })
}

/// Load a signer's secret share from its hex-encoded file.
pub fn load_secret_share(path: &Path, signer: u16) -> Result<SecretShare> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read share at {}", path.display()))?;
    let bytes = hex::decode(content.trim()).context("share file is not valid hex")?;
    SecretShare::from_bytes(signer, &bytes)
        .with_context(|| format!("invalid secret share for signer {signer}"))
}

/// Dealer: generate a signer set and write the key files.
///
/// Writes `roster.toml` plus `signer-<i>.key` for each signer into
/// `output_dir`. The threshold is fixed at two thirds plus one of `n`.
pub fn keygen(output_dir: &Path, n: u16) -> Result<()> {
    let t = threshold_for(n as usize);
    let out = generate_shares(n, t, &mut rand::thread_rng())?;

    std::fs::create_dir_all(output_dir).context("failed to create output directory")?;

    let roster = RosterFile {
        group_key: hex::encode(out.group_key.to_bytes()),
        signers: out
            .public_shares
            .iter()
            .map(|s| RosterEntry {
                index: s.signer(),
                public_key: hex::encode(s.to_bytes()),
            })
            .collect(),
    };
    let roster_path = output_dir.join("roster.toml");
    std::fs::write(&roster_path, toml::to_string_pretty(&roster)?)
        .context("failed to write roster")?;

    for share in &out.secret_shares {
        let path = output_dir.join(format!("signer-{}.key", share.signer()));
        std::fs::write(&path, hex::encode(share.to_bytes()))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    info!(
        n,
        t,
        roster = %roster_path.display(),
        "generated signer set"
    );
    println!("Generated {n} signer shares (threshold {t}) in {}", output_dir.display());
    println!("  roster:  {}", roster_path.display());
    println!("  shares:  signer-1.key .. signer-{n}.key");
    println!("Distribute each share file to its signer and delete it here.");
    Ok(())
}

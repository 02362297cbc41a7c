//! Compare-and-swap contender for cross-process store tests.
// crates/runcoord-store-file/src/bin/runcoord_cas_contender.rs
// ============================================================================
// Binary: CAS Contender
// Description: Increments a counter key through compare-and-swap retries.
// Purpose: Let tests race several OS processes on one store file.
// Dependencies: runcoord-store-file
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::io;
use std::path::PathBuf;

use runcoord_store_file::FileStoreConfig;
use runcoord_store_file::KeyValueFile;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing store path"))?;
    let key = args.next().unwrap_or_else(|| "counter".to_string());
    let increments: u32 = args.next().map_or(Ok(10), |raw| raw.parse())?;

    let mut config = FileStoreConfig::new(PathBuf::from(path));
    config.lock_timeout_ms = 30_000;
    config.sync_writes = false;
    let file = KeyValueFile::open(config)?;
    let no_extra = BTreeMap::new();
    for _ in 0..increments {
        loop {
            let current = file.load()?.get(&key).map(str::to_string);
            let next = match current.as_deref() {
                Some(raw) => raw.parse::<u64>()? + 1,
                None => 1,
            };
            if file.compare_and_swap(&key, current.as_deref(), &next.to_string(), &no_extra)? {
                break;
            }
        }
    }
    Ok(())
}

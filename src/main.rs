//! Headless driver: build a vessel, run it, report molecule statistics.

use covalence::chemistry::Chemistry;

const VESSEL_RADIUS: f32 = 15.0;
const RANDOM_SEED: u64 = 42;
const WORKERS: usize = 1;
const ATOMS: usize = 40;
const TICKS: usize = 2000;

fn main() {
    env_logger::init();
    let mut chem = Chemistry::new(VESSEL_RADIUS, RANDOM_SEED, WORKERS);
    chem.init(ATOMS);
    for tick in 0..TICKS {
        chem.update();
        if chem.bond_update {
            log::debug!("bond topology changed at tick {tick}");
        }
    }
    let stats = chem.molecule_stats();
    println!(
        "molecules: {} ({} closed), {} types ({} closed), avg size {:.2} (closed {:.2})",
        stats.count,
        stats.closed_count,
        stats.type_count,
        stats.closed_type_count,
        stats.average_size,
        stats.average_closed_size
    );
}

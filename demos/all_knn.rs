//! Computes the k nearest neighbors of a uniform point set and prints the table.
//!
//! ```bash
//! cargo run --release --example all_knn -- 2000 brute
//! cargo run --release --example all_knn -- 2000 kdtree
//! cargo run --release --example all_knn -- 2000 partitioned
//! ```

use allknn::prelude::*;
use rand::SeedableRng;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let count = args.first().and_then(|a| a.parse().ok()).unwrap_or(1_000);

    let base = KnnConfig {
        points: count,
        ..Default::default()
    };
    let config = match args.get(1).map(String::as_str) {
        Some("brute") => base.brute_force(),
        Some("kdtree") => base.spatial_index(),
        _ => base.partitioned(16.min(count), 8),
    };

    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let (_, table) = match allknn::solve_uniform(&config, &mut rng) {
        Ok(solved) => solved,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    for (id, neighbors) in table.iter() {
        print!("{id:>5}: ");
        for &n in neighbors {
            if n == NO_NEIGHBOR {
                print!("   -1 ");
            } else {
                print!("{n:>5} ");
            }
        }
        println!();
    }
}

use std::collections::HashSet;

use abse_core::{authority, encrypt, recombine, split, trapdoor, AttributeVector};
use ark_std::rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> abse_core::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("=== ABSE Demo ===\n");
    let mut rng = StdRng::seed_from_u64(42);

    // Step 1: Setup
    let universe: Vec<String> = ["age", "dept", "role"].iter().map(|s| s.to_string()).collect();
    println!("Step 1: Authority setup over U = {:?}", universe);
    let (pp, msk) = authority::setup(&universe, &mut rng);
    println!("  h_i generated for {} attributes\n", pp.dimension());

    // Step 2: Encrypt
    let keywords = vec!["secret".to_owned(), "q3-report".to_owned()];
    let policy: HashSet<String> = ["dept".to_owned()].into_iter().collect();
    println!("Step 2: Encrypt({:?}, P = {:?})", keywords, policy);
    let ct = encrypt(&pp, &keywords, &policy, &mut rng)?;
    println!("  ctw: {} GT elements, ct: {} G1 elements\n", ct.ctw.len(), ct.ct.len());

    // Step 3: Trapdoor
    let y = AttributeVector::new(vec![false, true, true]);
    let sk = authority::issue_key(&msk, &pp, &y, &mut rng);
    let td = trapdoor(&sk, &y, &keywords[..1]);
    println!("Step 3: Trapdoor for {:?}", &keywords[..1]);
    println!("  T has {} entries, d' = {}\n", td.t.len(), td.d_prime);

    // Step 4: Backup and recovery
    println!("Step 4: Split a secret into shares and recombine two of them");
    let shares = split(b"correct-horse-battery-staple", "hello world", &mut rng)?;
    let pair = [shares[3].clone(), shares[7].clone()];
    let recovered = recombine(b"correct-horse-battery-staple", &pair);
    println!("  {} shares, recovered = {:?}", shares.len(), recovered);
    let single = recombine(b"correct-horse-battery-staple", &shares[3..4]);
    println!("  from one share = {:?}", single);

    info!("demo finished");
    Ok(())
}

use rand::distr::{weighted::WeightedIndex, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{sleep, Duration};
use tracing::debug;

// Sleep for 1 to 3 seconds between queue polls, favoring shorter sleeps.
pub async fn weighted_sleep() {
    let worker_id = format!("{:?}", std::thread::current().id());

    // Weights for sleeping durations of 1, 2 and 3 seconds
    let weights = [3, 2, 1];

    let dist = WeightedIndex::new(weights).unwrap();
    let mut rng = StdRng::from_os_rng();
    let duration_index = dist.sample(&mut rng);

    let sleep_duration = Duration::from_secs((duration_index + 1) as u64);

    debug!("Worker {}: Sleeping for {:?}", worker_id, sleep_duration);
    sleep(sleep_duration).await;
}

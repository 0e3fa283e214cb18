use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn generate_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Receipt reference sent with every gateway order.
pub fn generate_order_receipt() -> String {
    format!("rcpt_{}", generate_token(20))
}

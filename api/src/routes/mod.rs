pub mod assistant;
pub mod health;

pub mod food;
pub mod game;
pub mod house;

pub use food::{business_reply, FoodSearchFlow};
pub use game::GuessingGameFlow;
pub use house::{map_reply, HouseMapFlow, MapSize, HOME_ADDRESS};

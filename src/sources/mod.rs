pub mod eventbrite;

pub use eventbrite::EventbriteSource;

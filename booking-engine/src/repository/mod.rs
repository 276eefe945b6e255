//! Typed access to the shared table, one repository per entity family.

mod bookings;
mod rooms;
mod users;

pub use bookings::BookingRepository;
pub use rooms::RoomRepository;
pub use users::UserRepository;

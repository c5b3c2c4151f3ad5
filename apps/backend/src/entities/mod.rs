pub mod app_settings;
pub mod articles;
pub mod members;
pub mod reservations;
pub mod sessions;

pub use app_settings::Entity as AppSettings;
pub use app_settings::Model as AppSetting;
pub use articles::Entity as Articles;
pub use articles::Model as Article;
pub use members::Entity as Members;
pub use members::Model as Member;
pub use members::MemberStatus;
pub use reservations::Entity as Reservations;
pub use reservations::Model as Reservation;
pub use reservations::ReservationStatus;
pub use sessions::Entity as Sessions;
pub use sessions::Model as Session;

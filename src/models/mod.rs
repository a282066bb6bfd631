pub mod session;
pub mod task;
pub mod token;
pub mod user;

pub use session::{Session, SessionFlash};
pub use task::{NewTask, Task, TaskChanges, TaskInput, TaskPriority};
pub use token::{NewToken, PersonalAccessToken};
pub use user::{NewUser, User, UserProfile};

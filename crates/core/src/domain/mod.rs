pub mod installation;
pub mod oauth_state;
pub mod reactions;

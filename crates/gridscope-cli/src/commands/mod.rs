pub mod run;
pub mod show;
pub mod status;
pub mod territories;

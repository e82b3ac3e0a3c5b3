pub mod mission;
pub mod survey;
pub mod swarm;

mod cli;
mod chains;
mod enrollment;

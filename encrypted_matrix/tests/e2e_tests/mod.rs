mod config;
mod multiply;
mod transpose;

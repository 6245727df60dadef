mod helpers;


#[cfg(unix)]
mod runner_tests;

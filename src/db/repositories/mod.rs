mod desks;
mod samples;

mod responses;
mod scenarios;
mod tiers;

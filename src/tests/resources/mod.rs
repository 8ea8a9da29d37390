mod claim_tests;
mod inventory_tests;

mod test_invariant_sweep;

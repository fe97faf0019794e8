mod persistent;

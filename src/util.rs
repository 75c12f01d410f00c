use ark_ff::PrimeField;

pub fn field_sum<F: PrimeField>(x: &[F]) -> F {
    x.iter().fold(F::ZERO, |acc, v| acc + v)
}

/// Sum of the entries of `values` whose bit in `mask` is set.
pub fn masked_sum<F: PrimeField>(values: &[F], mask: &[bool]) -> F {
    assert_eq!(
        values.len(),
        mask.len(),
        "mask has {} bits for {} values",
        mask.len(),
        values.len()
    );
    values
        .iter()
        .zip(mask)
        .filter(|(_, selected)| **selected)
        .fold(F::ZERO, |acc, (v, _)| acc + v)
}

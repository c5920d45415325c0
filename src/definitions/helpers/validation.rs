//! Applicative validation: combine independent field checks so a malformed
//! document reports every bad field at once instead of stopping at the first.

/// A validation outcome carrying all errors collected so far.
pub type Validated<T, E> = Result<T, Vec<E>>;

/// Promotes a plain fallible check into the accumulating form.
pub fn lift<T, E>(r: Result<T, E>) -> Validated<T, E> {
    r.map_err(|e| vec![e])
}

/// Combines two validations, merging their error lists when both fail.
pub fn zip<A, B, E>(a: Validated<A, E>, b: Validated<B, E>) -> Validated<(A, B), E> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(mut ea), Err(eb)) => {
            ea.extend(eb);
            Err(ea)
        }
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
    }
}

/// Combines four validations; errors accumulate left to right.
pub fn zip4<A, B, C, D, E>(
    a: Validated<A, E>,
    b: Validated<B, E>,
    c: Validated<C, E>,
    d: Validated<D, E>,
) -> Validated<(A, B, C, D), E> {
    let ((a, b), (c, d)) = zip(zip(a, b), zip(c, d))?;
    Ok((a, b, c, d))
}

//! Cross-component scenarios.


#[cfg(test)]
mod acknowledgement;
#[cfg(test)]
mod lifecycle;
#[cfg(test)]
mod negotiation;
#[cfg(test)]
mod recovery;
#[cfg(test)]
mod shutdown;
#[cfg(test)]
mod timeouts;

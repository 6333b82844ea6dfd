// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A stand-in for a request handler, with one hot function and one
//! allocation-heavy function for the profile to find.

#[inline(never)]
fn checksum(data: &[u8]) -> u64 {
    data.iter()
        .fold(0xcbf29ce484222325u64, |h, b| (h ^ *b as u64).wrapping_mul(0x100000001b3))
}

#[inline(never)]
fn build_response(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    out.extend((0..len).map(|_| rand::random::<u8>()));
    std::hint::black_box(out)
}

#[inline(never)]
fn handle_request() {
    let len = if rand::random::<f64>() < 0.01 { 1 << 20 } else { 4096 };
    let response = build_response(len);
    std::hint::black_box(checksum(&response));
}

pub async fn run() {
    let mut ts: Vec<tokio::task::JoinHandle<()>> = vec![];
    for _ in 0..4 {
        ts.push(tokio::task::spawn(async move {
            loop {
                tokio::task::yield_now().await;
                handle_request();
            }
        }));
    }
    for t in ts {
        t.await.ok();
    }
}
